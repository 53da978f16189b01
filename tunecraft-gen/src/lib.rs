//! tunecraft-gen library - Generation Status service
//!
//! Keeps locally persisted song records consistent with the true state of
//! the asynchronous generation job running at the external music provider,
//! and exposes the converged status over a small HTTP API.

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod services;

use services::reconciler::StatusReconciler;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Status reconciliation engine
    pub reconciler: Arc<StatusReconciler>,
}

impl AppState {
    /// Create new application state
    pub fn new(reconciler: Arc<StatusReconciler>) -> Self {
        Self { reconciler }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/api/songs/:id/status", get(api::song_status))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
