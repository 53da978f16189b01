//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tunecraft_common::db::create_songs_table;
use tunecraft_common::db::models::VariantSnapshot;
use tunecraft_gen::services::cache::StatusCaches;
use tunecraft_gen::services::reconciler::StatusReconciler;
use tunecraft_gen::services::song_store::SongStore;
use tunecraft_gen::services::suno_client::{
    GenerationProvider, ProviderError, ProviderPollResponse, ProviderStatus,
};

/// Provider double that pops scripted poll outcomes and counts calls.
///
/// An exhausted script reports a network error rather than panicking, so a
/// test that expects zero polls fails with a clear assertion instead of a
/// crashed task.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderPollResponse, ProviderError>>>,
    polls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderPollResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            polls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Simulate a slow provider so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn poll_job(&self, _task_id: &str) -> Result<ProviderPollResponse, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".to_string())))
    }
}

/// Successful poll outcome with the given provider status and variants
pub fn poll_ok(
    status: ProviderStatus,
    variants: Vec<VariantSnapshot>,
) -> Result<ProviderPollResponse, ProviderError> {
    Ok(ProviderPollResponse {
        status,
        variants,
        error_message: None,
    })
}

/// Terminal failure outcome with the given provider error message
pub fn poll_failed(
    status: ProviderStatus,
    error_message: &str,
) -> Result<ProviderPollResponse, ProviderError> {
    Ok(ProviderPollResponse {
        status,
        variants: Vec::new(),
        error_message: Some(error_message.to_string()),
    })
}

/// Variant snapshot with just the fields that drive status decisions
pub fn track(id: &str, audio_url: &str, stream_audio_url: &str) -> VariantSnapshot {
    VariantSnapshot {
        id: id.to_string(),
        audio_url: audio_url.to_string(),
        stream_audio_url: stream_audio_url.to_string(),
        ..Default::default()
    }
}

/// Store over a fresh in-memory database.
///
/// Pinned to a single connection: every pooled connection to `:memory:`
/// opens its own empty database, so concurrent tests would otherwise lose
/// the schema.
pub async fn setup_store() -> SongStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    create_songs_table(&pool).await.unwrap();
    SongStore::new(pool)
}

/// Engine wired to the given store and provider; the caches handle is
/// returned so tests can invalidate between steps.
pub fn setup_engine(
    store: SongStore,
    provider: Arc<ScriptedProvider>,
) -> (Arc<StatusReconciler>, Arc<StatusCaches>) {
    let caches = Arc::new(StatusCaches::new());
    let engine = Arc::new(StatusReconciler::new(
        store,
        provider,
        Arc::clone(&caches),
    ));
    (engine, caches)
}
