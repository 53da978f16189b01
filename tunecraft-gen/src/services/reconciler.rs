//! DB-first status reconciliation against the generation provider
//!
//! Answers "what is the status of song X" while guaranteeing fast responses
//! when the stored record already decides the question, at most one
//! outstanding provider poll per song, and convergence toward the provider's
//! truth without ever exposing a regression to a caller.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tunecraft_common::db::models::{SongRecord, SongStatus, VariantSnapshot};

use super::cache::{StatusCaches, RECORD_TTL, STATUS_TTL};
use super::error_classifier::{backoff_delay, should_retry, ClassifiedError, ErrorKind};
use super::song_store::SongStore;
use super::status_calculator;
use super::suno_client::{GenerationProvider, ProviderPollResponse};

/// Outcome of a status request
#[derive(Debug, Clone)]
pub struct StatusResult {
    pub status: SongStatus,
    /// Variant snapshots in provider-assigned order
    pub variants: Vec<VariantSnapshot>,
    /// Populated only when `status` is `Failed`
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// True when the stored record answered without a foreground provider poll
    pub returned_immediately: bool,
}

impl StatusResult {
    fn from_record(record: &SongRecord, returned_immediately: bool) -> Self {
        let failed = record.status == SongStatus::Failed;
        Self {
            status: record.status,
            variants: record.variants.clone(),
            error_code: failed.then(|| ErrorKind::ProviderError.code().to_string()),
            error_message: if failed {
                record.error_message.clone()
            } else {
                None
            },
            returned_immediately,
        }
    }
}

/// Stored non-terminal states may no longer reflect the provider's truth and
/// warrant a re-poll; terminal states never do.
fn refresh_needed(status: SongStatus) -> bool {
    matches!(status, SongStatus::Pending | SongStatus::StreamAvailable)
}

/// Status reconciliation engine
///
/// All state mutation goes through the song store; the engine holds only the
/// caches and the per-song flight locks that serialize provider polls.
/// Cloning is cheap (shared handles) and is how background tasks detach.
#[derive(Clone)]
pub struct StatusReconciler {
    store: SongStore,
    provider: Arc<dyn GenerationProvider>,
    caches: Arc<StatusCaches>,
    flights: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl StatusReconciler {
    pub fn new(
        store: SongStore,
        provider: Arc<dyn GenerationProvider>,
        caches: Arc<StatusCaches>,
    ) -> Self {
        Self {
            store,
            provider,
            caches,
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Report the current status of a generation job.
    ///
    /// DB-first: a stored terminal status is authoritative and answered
    /// without provider contact. Non-terminal records trigger a foreground
    /// poll, serialized per song so concurrent callers share one flight.
    /// Retryable poll failures degrade to the stored (stale but valid)
    /// status instead of surfacing an error.
    pub async fn get_status(&self, song_id: i64) -> Result<StatusResult, ClassifiedError> {
        let status_key = StatusCaches::status_key(song_id);

        if let Some(cached) = self.caches.status.get(&status_key) {
            return Ok(cached);
        }

        let record = self.read_record_cached(song_id).await?;

        if let Err(err) = self.store.increment_status_check_count(song_id).await {
            tracing::warn!(song_id, error = %err, "Failed to bump status check counter");
        }

        // Stored terminal state is authoritative: it was only ever written
        // after a successful convergence, so the calculator and provider are
        // not consulted again.
        if record.status.is_terminal() {
            let result = StatusResult::from_record(&record, true);
            self.caches
                .status
                .insert(status_key, result.clone(), STATUS_TTL);
            return Ok(result);
        }

        // Nothing to poll before the job reaches the provider
        let Some(task_id) = record.provider_task_id.clone() else {
            let result = StatusResult::from_record(&record, true);
            self.caches
                .status
                .insert(status_key, result.clone(), STATUS_TTL);
            return Ok(result);
        };

        // Second gate on the staleness decision; non-terminal states are
        // currently always refreshable, so a skipped refresh still gets a
        // background pass for the next caller.
        if !refresh_needed(record.status) {
            self.spawn_background_refresh(song_id, task_id);
            let result = StatusResult::from_record(&record, true);
            self.caches
                .status
                .insert(status_key, result.clone(), STATUS_TTL);
            return Ok(result);
        }

        // Foreground poll, single-flight per song
        let flight = self.flight_lock(song_id).await;
        let _guard = flight.lock().await;

        // A concurrent flight may have refreshed while we waited for the lock
        if let Some(cached) = self.caches.status.get(&status_key) {
            return Ok(cached);
        }

        match self.poll_and_persist(song_id, &task_id, false).await {
            Ok(result) => Ok(result),
            Err(err) if err.retryable => {
                // Availability over freshness: the stored record is stale but
                // valid, and the caller will poll again later.
                tracing::warn!(
                    song_id,
                    error = %err,
                    "Provider poll failed, serving stored status"
                );
                Ok(StatusResult::from_record(&record, false))
            }
            Err(err) => Err(err),
        }
    }

    /// Fire-and-forget refresh pass for one song.
    ///
    /// Structurally contained: the spawned task catches and logs every
    /// failure, so a broken background pass can never surface to a caller.
    /// Safe to run concurrently with foreground polls (shared flight lock)
    /// and after the job finished (merge and status writes never regress).
    pub fn spawn_background_refresh(
        &self,
        song_id: i64,
        task_id: String,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();

        tokio::spawn(async move {
            let flight = engine.flight_lock(song_id).await;
            let _guard = flight.lock().await;

            // A foreground poll may have converged while we waited
            match engine.store.read_record(song_id).await {
                Ok(Some(record)) if record.status.is_terminal() => return,
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(song_id, "Background refresh: record no longer exists");
                    return;
                }
                Err(err) => {
                    tracing::warn!(song_id, error = %err, "Background refresh: read failed");
                    return;
                }
            }

            if let Err(err) = engine.poll_and_persist(song_id, &task_id, true).await {
                tracing::warn!(song_id, error = %err, "Background refresh failed");
            }
        })
    }

    /// One poll-merge-persist pass: provider poll, non-regressing variant
    /// merge, status recomputation, persist, cache invalidation.
    async fn poll_and_persist(
        &self,
        song_id: i64,
        task_id: &str,
        with_retry: bool,
    ) -> Result<StatusResult, ClassifiedError> {
        let poll = if with_retry {
            self.poll_with_retry(task_id).await?
        } else {
            self.provider
                .poll_job(task_id)
                .await
                .map_err(|e| ClassifiedError::from_provider(&e))?
        };

        if poll.status.is_failure() {
            return self.persist_failure(song_id, &poll).await;
        }

        let record = self
            .store
            .write_merged_variants(song_id, &poll.variants)
            .await
            .map_err(|e| ClassifiedError::from_store(&e))?;

        let calculation = status_calculator::calculate(&record.variants);
        self.store
            .write_status(song_id, calculation.overall_status, None)
            .await
            .map_err(|e| ClassifiedError::from_store(&e))?;

        self.caches.invalidate(song_id);
        self.caches
            .record
            .insert(StatusCaches::record_key(song_id), record.clone(), RECORD_TTL);

        tracing::info!(
            song_id,
            status = %calculation.overall_status,
            variants = record.variants.len(),
            stream_ready = calculation.has_any_stream_ready,
            "Reconciled job status"
        );

        let result = StatusResult {
            status: calculation.overall_status,
            variants: record.variants,
            error_code: None,
            error_message: None,
            returned_immediately: false,
        };
        self.caches.status.insert(
            StatusCaches::status_key(song_id),
            result.clone(),
            STATUS_TTL,
        );
        Ok(result)
    }

    /// The provider reported a terminal failure: persist it and answer with
    /// the classified message.
    async fn persist_failure(
        &self,
        song_id: i64,
        poll: &ProviderPollResponse,
    ) -> Result<StatusResult, ClassifiedError> {
        let message = poll
            .error_message
            .clone()
            .unwrap_or_else(|| format!("Generation failed ({:?})", poll.status));

        tracing::warn!(song_id, status = ?poll.status, message = %message, "Provider reported terminal failure");

        self.store
            .write_status(song_id, SongStatus::Failed, Some(&message))
            .await
            .map_err(|e| ClassifiedError::from_store(&e))?;
        self.caches.invalidate(song_id);

        let variants = match self.store.read_record(song_id).await {
            Ok(Some(record)) => record.variants,
            _ => Vec::new(),
        };

        let result = StatusResult {
            status: SongStatus::Failed,
            variants,
            error_code: Some(ErrorKind::ProviderError.code().to_string()),
            error_message: Some(message),
            returned_immediately: false,
        };
        self.caches.status.insert(
            StatusCaches::status_key(song_id),
            result.clone(),
            STATUS_TTL,
        );
        Ok(result)
    }

    /// Provider poll with bounded exponential backoff. Only used where no
    /// caller is waiting on the response.
    async fn poll_with_retry(
        &self,
        task_id: &str,
    ) -> Result<ProviderPollResponse, ClassifiedError> {
        let mut attempt = 0;
        loop {
            match self.provider.poll_job(task_id).await {
                Ok(poll) => return Ok(poll),
                Err(err) => {
                    let classified = ClassifiedError::from_provider(&err);
                    if !should_retry(&classified, attempt) {
                        return Err(classified);
                    }
                    let delay = backoff_delay(attempt);
                    tracing::debug!(
                        task_id = %task_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %classified,
                        "Retrying provider poll after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Record read through the snapshot cache
    async fn read_record_cached(&self, song_id: i64) -> Result<SongRecord, ClassifiedError> {
        let record_key = StatusCaches::record_key(song_id);

        if let Some(record) = self.caches.record.get(&record_key) {
            return Ok(record);
        }

        let record = self
            .store
            .read_record(song_id)
            .await
            .map_err(|e| ClassifiedError::from_store(&e))?
            .ok_or_else(|| ClassifiedError::record_not_found(song_id))?;

        self.caches
            .record
            .insert(record_key, record.clone(), RECORD_TTL);
        Ok(record)
    }

    /// Per-song lock ensuring at most one provider poll in flight
    async fn flight_lock(&self, song_id: i64) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        flights
            .entry(song_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
