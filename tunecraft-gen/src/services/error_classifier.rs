//! Failure classification and retry policy
//!
//! Maps provider and store failures into a closed taxonomy, each entry
//! carrying a user-facing message, a retryability flag, and a severity.
//! Callers never see a raw transport or database error.

use rand::Rng;
use std::time::Duration;
use thiserror::Error;

use super::suno_client::ProviderError;

const MAX_RETRY_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_JITTER_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 30_000;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkError,
    RateLimited,
    Timeout,
    NotFound,
    ProviderError,
    StoreError,
    AuthError,
    ServerError,
    UnknownError,
}

impl ErrorKind {
    /// Stable code string exposed in API responses
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ProviderError => "PROVIDER_ERROR",
            ErrorKind::StoreError => "STORE_ERROR",
            ErrorKind::AuthError => "AUTH_ERROR",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

/// How bad a failure is; `Critical` failures are never retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// A failure mapped into the fixed taxonomy
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", .kind.code())]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Internal detail, for logs
    pub message: String,
    /// Safe to show to an end user
    pub user_message: String,
    pub retryable: bool,
    pub severity: Severity,
}

impl ClassifiedError {
    fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        user_message: &str,
        retryable: bool,
        severity: Severity,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            user_message: user_message.to_string(),
            retryable,
            severity,
        }
    }

    /// Classify a provider client failure
    pub fn from_provider(err: &ProviderError) -> Self {
        match err {
            ProviderError::Network(detail) => Self::new(
                ErrorKind::NetworkError,
                detail.clone(),
                "Could not reach the music generation service. Please try again shortly.",
                true,
                Severity::Error,
            ),
            ProviderError::Timeout(detail) => Self::new(
                ErrorKind::Timeout,
                detail.clone(),
                "The music generation service took too long to respond.",
                true,
                Severity::Warning,
            ),
            ProviderError::RateLimited => Self::new(
                ErrorKind::RateLimited,
                "provider rate limit hit",
                "Too many requests right now. Please wait a moment.",
                true,
                Severity::Warning,
            ),
            ProviderError::TaskNotFound(task_id) => Self::new(
                ErrorKind::NotFound,
                format!("provider task {task_id} not found"),
                "This generation task no longer exists at the provider.",
                false,
                Severity::Error,
            ),
            ProviderError::InvalidApiKey => Self::new(
                ErrorKind::AuthError,
                "provider rejected the API key",
                "The generation service is not available right now.",
                false,
                Severity::Critical,
            ),
            ProviderError::Api(code, detail) if *code >= 500 => Self::new(
                ErrorKind::ServerError,
                format!("provider returned {code}: {detail}"),
                "The music generation service reported a temporary problem.",
                true,
                Severity::Error,
            ),
            ProviderError::Api(code, detail) => Self::new(
                ErrorKind::ProviderError,
                format!("provider returned {code}: {detail}"),
                "The music generation service rejected the request.",
                false,
                Severity::Error,
            ),
            ProviderError::Parse(detail) => Self::new(
                ErrorKind::ProviderError,
                detail.clone(),
                "The music generation service returned an unexpected response.",
                false,
                Severity::Error,
            ),
        }
    }

    /// Classify a persistence failure
    pub fn from_store(err: &tunecraft_common::Error) -> Self {
        match err {
            tunecraft_common::Error::NotFound(detail) => Self::new(
                ErrorKind::NotFound,
                detail.clone(),
                "Song not found.",
                false,
                Severity::Warning,
            ),
            other => Self::new(
                ErrorKind::StoreError,
                other.to_string(),
                "Could not load the song right now. Please try again.",
                true,
                Severity::Error,
            ),
        }
    }

    /// The requested song record does not exist
    pub fn record_not_found(song_id: i64) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("song {song_id} not found"),
            "Song not found.",
            false,
            Severity::Warning,
        )
    }
}

/// Retry gate: retryable kinds only, bounded attempts, never on critical
/// severity.
pub fn should_retry(error: &ClassifiedError, attempt_count: u32) -> bool {
    error.retryable && attempt_count < MAX_RETRY_ATTEMPTS && error.severity != Severity::Critical
}

/// Exponential backoff with jitter: 1 s base doubling per attempt, plus up
/// to 1 s of random jitter, capped at 30 s.
pub fn backoff_delay(attempt_count: u32) -> Duration {
    let exponential = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt_count.min(16));
    let jitter = rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS);
    Duration::from_millis((exponential + jitter).min(BACKOFF_CAP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_retryable() {
        let err = ClassifiedError::from_provider(&ProviderError::Network("refused".into()));
        assert_eq!(err.kind, ErrorKind::NetworkError);
        assert!(err.retryable);
    }

    #[test]
    fn test_timeout_and_rate_limit_are_retryable_warnings() {
        let timeout = ClassifiedError::from_provider(&ProviderError::Timeout("30s".into()));
        assert_eq!(timeout.kind, ErrorKind::Timeout);
        assert!(timeout.retryable);
        assert_eq!(timeout.severity, Severity::Warning);

        let limited = ClassifiedError::from_provider(&ProviderError::RateLimited);
        assert_eq!(limited.kind, ErrorKind::RateLimited);
        assert!(limited.retryable);
    }

    #[test]
    fn test_auth_error_is_critical_and_final() {
        let err = ClassifiedError::from_provider(&ProviderError::InvalidApiKey);
        assert_eq!(err.kind, ErrorKind::AuthError);
        assert!(!err.retryable);
        assert_eq!(err.severity, Severity::Critical);
        assert!(!should_retry(&err, 0));
    }

    #[test]
    fn test_api_status_splits_server_and_provider_errors() {
        let server = ClassifiedError::from_provider(&ProviderError::Api(503, "down".into()));
        assert_eq!(server.kind, ErrorKind::ServerError);
        assert!(server.retryable);

        let rejected = ClassifiedError::from_provider(&ProviderError::Api(400, "bad".into()));
        assert_eq!(rejected.kind, ErrorKind::ProviderError);
        assert!(!rejected.retryable);
    }

    #[test]
    fn test_should_retry_caps_attempts() {
        let err = ClassifiedError::from_provider(&ProviderError::Network("refused".into()));
        assert!(should_retry(&err, 0));
        assert!(should_retry(&err, 2));
        assert!(!should_retry(&err, 3));
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err =
            ClassifiedError::from_store(&tunecraft_common::Error::NotFound("song 7".into()));
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(!err.retryable);
    }

    #[test]
    fn test_backoff_grows_exponentially_with_jitter() {
        for _ in 0..20 {
            let first = backoff_delay(0).as_millis() as u64;
            assert!((1_000..2_000).contains(&first), "attempt 0: {first}");

            let third = backoff_delay(2).as_millis() as u64;
            assert!((4_000..5_000).contains(&third), "attempt 2: {third}");
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        for _ in 0..20 {
            assert!(backoff_delay(10) <= Duration::from_millis(BACKOFF_CAP_MS));
            assert!(backoff_delay(40) <= Duration::from_millis(BACKOFF_CAP_MS));
        }
    }
}
