//! Database models for song generation records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall status of a song generation job.
///
/// Transitions only follow `Pending → StreamAvailable → Completed`, with any
/// state allowed to move to `Failed`. No edge leads out of `Completed` or
/// `Failed`; the store refuses writes that would regress a terminal row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SongStatus {
    /// Job submitted, no playable audio yet
    Pending,
    /// At least one variant has streamable audio
    StreamAvailable,
    /// Every variant has downloadable audio
    Completed,
    /// Provider reported a terminal failure
    Failed,
}

impl SongStatus {
    /// Database TEXT representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SongStatus::Pending => "PENDING",
            SongStatus::StreamAvailable => "STREAM_AVAILABLE",
            SongStatus::Completed => "COMPLETED",
            SongStatus::Failed => "FAILED",
        }
    }

    /// Parse the database TEXT representation
    pub fn parse(value: &str) -> Option<SongStatus> {
        match value {
            "PENDING" => Some(SongStatus::Pending),
            "STREAM_AVAILABLE" => Some(SongStatus::StreamAvailable),
            "COMPLETED" => Some(SongStatus::Completed),
            "FAILED" => Some(SongStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states are authoritative and never re-polled
    pub fn is_terminal(&self) -> bool {
        matches!(self, SongStatus::Completed | SongStatus::Failed)
    }
}

impl std::fmt::Display for SongStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness of a single variant, derived from URL presence. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantStatus {
    /// No playable audio yet
    Pending,
    /// Streamable-but-not-final audio available
    StreamReady,
    /// Final downloadable audio available
    DownloadReady,
}

/// One candidate rendering of a song, as reported by the generation provider.
///
/// Embedded in `SongRecord.variants` (JSON column); not independently
/// persisted. URL fields are empty strings until the corresponding artifact
/// exists. Descriptive metadata is carried along but never used for status
/// decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantSnapshot {
    /// Provider-assigned identifier, stable across polls
    pub id: String,
    pub audio_url: String,
    pub source_audio_url: String,
    pub stream_audio_url: String,
    pub source_stream_audio_url: String,
    pub image_url: String,
    pub title: String,
    pub prompt: String,
    pub tags: String,
    pub model_name: String,
    pub create_time: String,
    /// Track length in seconds (0.0 until reported)
    pub duration: f64,
}

/// Persisted record of one generation job (`songs` table row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: i64,
    /// Opaque provider task identifier; write-once, None before submission
    pub provider_task_id: Option<String>,
    pub status: SongStatus,
    /// Variant snapshots in provider-assigned order
    pub variants: Vec<VariantSnapshot>,
    /// Last known failure detail; cleared on success
    pub error_message: Option<String>,
    pub status_checked_at: Option<DateTime<Utc>>,
    pub last_status_check: Option<DateTime<Utc>>,
    /// Number of status checks performed, observability only
    pub status_check_count: i64,
}
