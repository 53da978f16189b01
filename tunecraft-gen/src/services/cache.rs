//! In-process TTL caches for status responses and record snapshots
//!
//! Repeated status requests within a short window are answered from memory
//! instead of re-reading the database or re-polling the provider. Two
//! instances with different lifetimes are used: a short-lived cache for
//! computed status responses and a longer-lived cache for raw record
//! snapshots. A periodic sweeper bounds memory independent of access
//! patterns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tunecraft_common::db::models::SongRecord;

use super::reconciler::StatusResult;

/// TTL for computed status responses
pub const STATUS_TTL: Duration = Duration::from_secs(30);

/// TTL for raw record snapshots
pub const RECORD_TTL: Duration = Duration::from_secs(300);

/// Interval between background cleanup sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Entry bound per cache instance
const DEFAULT_MAX_SIZE: usize = 1024;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// Bounded key/value cache with per-entry TTL.
///
/// TTL is wall-clock since insertion, not sliding: an entry is never trusted
/// past its TTL regardless of how often it is read. When the cache is full,
/// the oldest-inserted entry is evicted to make room. Internally
/// synchronized; share via `Arc`.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    max_size: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size,
        }
    }

    /// Insert or replace an entry with the given TTL
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut entries = self.entries.lock().unwrap();

        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            // Evict the oldest-inserted entry to stay within bounds
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Look up a live entry; expired entries are dropped on access
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// True when a live entry exists for the key
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries.get(key).is_some_and(|entry| !entry.is_expired())
    }

    /// Drop an entry, live or not
    pub fn remove(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Purge all expired entries; returns the number purged
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Current entry count (live and expired-but-unswept)
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The two cache instances backing the reconciler
pub struct StatusCaches {
    /// Short-lived cache for computed status responses
    pub status: TtlCache<StatusResult>,
    /// Longer-lived cache for raw record snapshots
    pub record: TtlCache<SongRecord>,
}

impl StatusCaches {
    pub fn new() -> Self {
        Self {
            status: TtlCache::new(DEFAULT_MAX_SIZE),
            record: TtlCache::new(DEFAULT_MAX_SIZE),
        }
    }

    /// Cache key for a computed status response
    pub fn status_key(song_id: i64) -> String {
        format!("status:{song_id}")
    }

    /// Cache key for a raw record snapshot
    pub fn record_key(song_id: i64) -> String {
        format!("record:{song_id}")
    }

    /// Drop both entries for a song after its record changed
    pub fn invalidate(&self, song_id: i64) {
        self.status.remove(&Self::status_key(song_id));
        self.record.remove(&Self::record_key(song_id));
    }
}

impl Default for StatusCaches {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the periodic cleanup sweep over both cache instances.
///
/// Runs until the token is cancelled at shutdown.
pub fn spawn_cache_sweeper(
    caches: Arc<StatusCaches>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Cache sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    let purged = caches.status.cleanup() + caches.record.cleanup();
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired cache entries");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache: TtlCache<String> = TtlCache::new(16);
        cache.insert("a", "one".to_string(), Duration::from_secs(60));

        assert_eq!(cache.get("a"), Some("one".to_string()));
        assert!(cache.contains("a"));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache: TtlCache<i32> = TtlCache::new(16);
        cache.insert("a", 1, Duration::from_millis(40));

        assert_eq!(cache.get("a"), Some(1));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_ttl_is_not_sliding() {
        let cache: TtlCache<i32> = TtlCache::new(16);
        cache.insert("a", 1, Duration::from_millis(80));

        // Repeated reads must not extend the lifetime
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("a"), Some(1));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_oldest_entry_evicted_when_full() {
        let cache: TtlCache<i32> = TtlCache::new(2);
        cache.insert("first", 1, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("second", 2, Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("third", 3, Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("first"), None);
        assert_eq!(cache.get("second"), Some(2));
        assert_eq!(cache.get("third"), Some(3));
    }

    #[test]
    fn test_replacing_existing_key_does_not_evict() {
        let cache: TtlCache<i32> = TtlCache::new(2);
        cache.insert("a", 1, Duration::from_secs(60));
        cache.insert("b", 2, Duration::from_secs(60));
        cache.insert("a", 10, Duration::from_secs(60));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_cleanup_purges_only_expired() {
        let cache: TtlCache<i32> = TtlCache::new(16);
        cache.insert("short", 1, Duration::from_millis(20));
        cache.insert("long", 2, Duration::from_secs(60));

        std::thread::sleep(Duration::from_millis(40));
        let purged = cache.cleanup();

        assert_eq!(purged, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[test]
    fn test_remove() {
        let cache: TtlCache<i32> = TtlCache::new(16);
        cache.insert("a", 1, Duration::from_secs(60));
        cache.remove("a");
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_cache_keys_are_distinct_per_song() {
        assert_ne!(StatusCaches::status_key(1), StatusCaches::record_key(1));
        assert_ne!(StatusCaches::status_key(1), StatusCaches::status_key(2));
    }
}
