//! Song generation status endpoint

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tunecraft_common::db::models::{SongStatus, VariantSnapshot};

use crate::services::error_classifier::ErrorKind;
use crate::AppState;

/// Response payload for GET /api/songs/:id/status
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongStatusResponse {
    pub status: SongStatus,
    pub variants: Vec<VariantSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// GET /api/songs/:id/status
///
/// Thin wrapper over the reconciliation engine. Errors surface only as
/// classified payloads, never as raw internals: a missing record is 404,
/// everything else is a 502/500 with the user-facing message.
pub async fn song_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SongStatusResponse>, (StatusCode, Json<serde_json::Value>)> {
    match state.reconciler.get_status(id).await {
        Ok(result) => Ok(Json(SongStatusResponse {
            status: result.status,
            variants: result.variants,
            error_code: result.error_code,
            error_message: result.error_message,
        })),
        Err(err) if err.kind == ErrorKind::NotFound => Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": err.user_message,
                "errorCode": err.kind.code(),
            })),
        )),
        Err(err) => {
            tracing::error!(song_id = id, error = %err, "Status request failed");
            let http_status = match err.kind {
                ErrorKind::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            };
            Err((
                http_status,
                Json(json!({
                    "error": err.user_message,
                    "errorCode": err.kind.code(),
                })),
            ))
        }
    }
}
