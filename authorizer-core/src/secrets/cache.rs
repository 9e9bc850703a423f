use super::SecretDocument;
use moka::future::Cache as MokaCache;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cached secret document together with its age
#[derive(Clone, Debug)]
pub struct CacheEntry {
    value: Arc<SecretDocument>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: SecretDocument, ttl: Duration) -> Self {
        Self {
            value: Arc::new(value),
            fetched_at: Instant::now(),
            ttl,
        }
    }

    pub fn value(&self) -> Arc<SecretDocument> {
        Arc::clone(&self.value)
    }

    /// True while `now - fetched_at < ttl`
    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Per-process cache of secret documents.
///
/// Created empty when the process starts and shared (cheaply cloned) between
/// every resolver of that process. Nothing in it is visible to other
/// processes, so a cold process always fetches from the store.
#[derive(Clone)]
pub struct SecretCache {
    pub(super) entries: MokaCache<String, CacheEntry>,
    ttl: Duration,
}

impl SecretCache {
    /// Initialize a new cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        let entries = MokaCache::builder()
            .time_to_live(ttl)
            .max_capacity(64)
            .build();
        Self { entries, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry stored under `key` if it is still fresh
    pub async fn get_fresh(&self, key: &str) -> Option<CacheEntry> {
        match self.entries.get(key).await {
            Some(entry) if entry.is_fresh() => Some(entry),
            Some(_) => {
                self.entries.invalidate(key).await;
                None
            }
            None => None,
        }
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.invalidate(key).await;
    }
}
