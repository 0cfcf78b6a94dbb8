/// Resolution cache
///
/// Advisory memoization of resolved documents keyed by DID. Entries are served
/// only while `now - fetched_at < ttl`; concurrent writers overwrite each other.
use crate::did::Did;
use crate::ledger::ResolvedDocument;
use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

const CACHE_TYPE: &str = "resolution";

/// Cached resolution result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub did: Did,
    pub resolved: ResolvedDocument,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < ttl
    }
}

/// TTL cache shared by clones
#[derive(Clone)]
pub struct ResolutionCache {
    entries: Arc<RwLock<HashMap<Did, CacheEntry>>>,
    ttl: Duration,
}

impl ResolutionCache {
    /// Create a cache; a TTL too large for chrono is clamped
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(36_500)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for the DID, if any
    pub async fn get(&self, did: &Did) -> Option<ResolvedDocument> {
        let entries = self.entries.read().await;
        let hit = entries
            .get(did)
            .filter(|entry| entry.is_fresh(self.ttl, Utc::now()))
            .map(|entry| entry.resolved.clone());

        metrics::record_cache_access(CACHE_TYPE, hit.is_some());
        if hit.is_some() {
            debug!("Resolution cache hit for {}", did);
        }
        hit
    }

    /// Store a result, replacing whatever was there
    pub async fn put(&self, did: &Did, resolved: ResolvedDocument) {
        let mut entries = self.entries.write().await;
        entries.insert(
            did.clone(),
            CacheEntry {
                did: did.clone(),
                resolved,
                fetched_at: Utc::now(),
            },
        );
        metrics::set_cache_size(entries.len());
    }

    /// Drop the entry for a DID; returns whether one existed
    pub async fn invalidate(&self, did: &Did) -> bool {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(did).is_some();
        metrics::set_cache_size(entries.len());
        removed
    }

    /// Remove expired entries and return how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(self.ttl, now));
        metrics::set_cache_size(entries.len());
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Run `cleanup_expired` on a fixed period until the handle is aborted
    pub fn spawn_cleanup(&self, period: std::time::Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = interval(period);
            loop {
                interval.tick().await;
                let count = cache.cleanup_expired().await;
                if count > 0 {
                    info!("Cleaned up {} expired resolution cache entries", count);
                }
            }
        })
    }
}
