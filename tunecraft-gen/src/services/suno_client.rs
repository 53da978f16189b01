//! Suno generation API client (sunoapi.org gateway)
//!
//! Polls the state of a submitted generation task. The reconciler consumes
//! this through the `GenerationProvider` trait so tests can substitute a
//! scripted provider.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tunecraft_common::db::models::VariantSnapshot;

const SUNO_BASE_URL: &str = "https://api.sunoapi.org";
const USER_AGENT: &str = "tunecraft/0.1.0";
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider client errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Provider-native task status vocabulary.
///
/// Only two facts are consumed from it: whether the task failed terminally,
/// and whatever variants accompany the response. Progress distinctions
/// (text done, first track done) are carried by the variant URLs themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    Pending,
    TextSuccess,
    FirstSuccess,
    Success,
    CreateTaskFailed,
    GenerateAudioFailed,
    CallbackException,
    SensitiveWordError,
    /// Forward compatibility: any vocabulary the gateway adds later
    #[serde(other)]
    Unknown,
}

impl ProviderStatus {
    /// Terminal failure codes; everything else is in-progress or complete
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ProviderStatus::CreateTaskFailed
                | ProviderStatus::GenerateAudioFailed
                | ProviderStatus::CallbackException
                | ProviderStatus::SensitiveWordError
        )
    }
}

/// Result of polling a generation task
#[derive(Debug, Clone)]
pub struct ProviderPollResponse {
    pub status: ProviderStatus,
    /// Variants present in the poll, mapped to the persisted snapshot shape
    pub variants: Vec<VariantSnapshot>,
    pub error_message: Option<String>,
}

/// Interface the reconciler uses to reach the generation provider
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Poll the provider for the current state of a task
    async fn poll_job(&self, task_id: &str) -> Result<ProviderPollResponse, ProviderError>;
}

// Wire shapes for GET /api/v1/generate/record-info

#[derive(Debug, Deserialize)]
struct RecordInfoEnvelope {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<RecordInfoData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordInfoData {
    status: ProviderStatus,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    response: Option<TrackListing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackListing {
    #[serde(default)]
    suno_data: Vec<SunoTrack>,
}

/// One track as returned by the gateway; every field may be missing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SunoTrack {
    id: String,
    audio_url: String,
    source_audio_url: String,
    stream_audio_url: String,
    source_stream_audio_url: String,
    image_url: String,
    title: String,
    prompt: String,
    tags: String,
    model_name: String,
    create_time: String,
    duration: f64,
}

impl SunoTrack {
    /// Field-by-field mapping into the persisted snapshot shape; absent
    /// fields stay empty rather than failing the whole poll.
    fn into_snapshot(self) -> VariantSnapshot {
        VariantSnapshot {
            id: self.id,
            audio_url: self.audio_url,
            source_audio_url: self.source_audio_url,
            stream_audio_url: self.stream_audio_url,
            source_stream_audio_url: self.source_stream_audio_url,
            image_url: self.image_url,
            title: self.title,
            prompt: self.prompt,
            tags: self.tags,
            model_name: self.model_name,
            create_time: self.create_time,
            duration: self.duration,
        }
    }
}

/// HTTP client for the Suno gateway
pub struct SunoClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SunoClient {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, SUNO_BASE_URL)
    }

    /// Point the client at a different gateway (tests, self-hosted proxies)
    pub fn with_base_url(
        api_key: String,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(POLL_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl GenerationProvider for SunoClient {
    async fn poll_job(&self, task_id: &str) -> Result<ProviderPollResponse, ProviderError> {
        let url = format!("{}/api/v1/generate/record-info", self.base_url);

        tracing::debug!(task_id = %task_id, "Polling generation task");

        let response = self
            .http_client
            .get(&url)
            .query(&[("taskId", task_id)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 401 || status == 403 {
            return Err(ProviderError::InvalidApiKey);
        }

        if status == 404 {
            return Err(ProviderError::TaskNotFound(task_id.to_string()));
        }

        if status == 429 {
            return Err(ProviderError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), error_text));
        }

        let envelope: RecordInfoEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if envelope.code != 200 {
            return Err(ProviderError::Api(envelope.code as u16, envelope.msg));
        }

        let data = envelope
            .data
            .ok_or_else(|| ProviderError::Parse("record-info response missing data".to_string()))?;

        let variants: Vec<VariantSnapshot> = data
            .response
            .map(|listing| {
                listing
                    .suno_data
                    .into_iter()
                    .map(SunoTrack::into_snapshot)
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(
            task_id = %task_id,
            status = ?data.status,
            variants = variants.len(),
            "Polled generation task"
        );

        Ok(ProviderPollResponse {
            status: data.status,
            variants,
            error_message: data.error_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SunoClient::new("test-key".to_string());
        assert!(client.is_ok());
    }

    #[test]
    fn test_failure_status_classification() {
        assert!(ProviderStatus::GenerateAudioFailed.is_failure());
        assert!(ProviderStatus::CreateTaskFailed.is_failure());
        assert!(ProviderStatus::CallbackException.is_failure());
        assert!(ProviderStatus::SensitiveWordError.is_failure());
        assert!(!ProviderStatus::Pending.is_failure());
        assert!(!ProviderStatus::FirstSuccess.is_failure());
        assert!(!ProviderStatus::Success.is_failure());
        assert!(!ProviderStatus::Unknown.is_failure());
    }

    #[test]
    fn test_record_info_parsing_maps_tracks() {
        let payload = r#"
        {
            "code": 200,
            "msg": "success",
            "data": {
                "taskId": "task-123",
                "status": "FIRST_SUCCESS",
                "response": {
                    "sunoData": [
                        {
                            "id": "v1",
                            "streamAudioUrl": "https://cdn/stream-v1.mp3",
                            "title": "Morning Light",
                            "modelName": "chirp-v4",
                            "duration": 181.2
                        },
                        {
                            "id": "v2"
                        }
                    ]
                }
            }
        }
        "#;

        let envelope: RecordInfoEnvelope = serde_json::from_str(payload).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.status, ProviderStatus::FirstSuccess);

        let tracks = data.response.unwrap().suno_data;
        assert_eq!(tracks.len(), 2);

        let first = tracks.into_iter().next().unwrap().into_snapshot();
        assert_eq!(first.id, "v1");
        assert_eq!(first.stream_audio_url, "https://cdn/stream-v1.mp3");
        assert_eq!(first.title, "Morning Light");
        assert!(first.audio_url.is_empty());
        assert_eq!(first.duration, 181.2);
    }

    #[test]
    fn test_unknown_provider_status_is_tolerated() {
        let payload = r#"{"code": 200, "msg": "", "data": {"status": "SOMETHING_NEW"}}"#;
        let envelope: RecordInfoEnvelope = serde_json::from_str(payload).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.status, ProviderStatus::Unknown);
        assert!(!data.status.is_failure());
    }

    #[test]
    fn test_failure_payload_carries_error_message() {
        let payload = r#"
        {
            "code": 200,
            "msg": "success",
            "data": {
                "status": "GENERATE_AUDIO_FAILED",
                "errorMessage": "Audio generation failed"
            }
        }
        "#;

        let envelope: RecordInfoEnvelope = serde_json::from_str(payload).unwrap();
        let data = envelope.data.unwrap();
        assert!(data.status.is_failure());
        assert_eq!(data.error_message.as_deref(), Some("Audio generation failed"));
    }
}
