use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use shared::{
    domain::{CacheKey, PageResult},
    error::PageError,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

pub type FetchOutcome<T> = Result<Arc<PageResult<T>>, PageError>;
type SharedFetch<T> = Shared<BoxFuture<'static, FetchOutcome<T>>>;

#[derive(Debug)]
pub struct CacheEntry<T> {
    pub result: Arc<PageResult<T>>,
    pub updated_at: DateTime<Utc>,
    stored_at: Instant,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            result: Arc::clone(&self.result),
            updated_at: self.updated_at,
            stored_at: self.stored_at,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.stored_at.elapsed() >= stale_time
    }

    fn is_expired(&self, cache_time: Duration) -> bool {
        self.stored_at.elapsed() >= cache_time
    }
}

/// Result cache and in-flight request registry shared by every controller
/// that pages through the same namespace.
pub struct QueryCache<T> {
    entries: Mutex<HashMap<CacheKey, CacheEntry<T>>>,
    inflight: Mutex<HashMap<CacheKey, SharedFetch<T>>>,
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Send + Sync + 'static> QueryCache<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn lookup(&self, key: &CacheKey, cache_time: Duration) -> Option<CacheEntry<T>> {
        let mut entries = self.entries.lock().await;
        if entries.get(key)?.is_expired(cache_time) {
            debug!(page = key.page, search = %key.search, "pagination: evicting expired cache entry");
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }

    /// Stores a fresh result and drops every entry older than `cache_time`.
    pub async fn insert(
        &self,
        key: CacheKey,
        result: Arc<PageResult<T>>,
        cache_time: Duration,
    ) -> CacheEntry<T> {
        let entry = CacheEntry {
            result,
            updated_at: Utc::now(),
            stored_at: Instant::now(),
        };
        let mut entries = self.entries.lock().await;
        let evicted = evict_expired(&mut entries, cache_time);
        if evicted > 0 {
            debug!(evicted, "pagination: evicted expired cache entries");
        }
        entries.insert(key, entry.clone());
        entry
    }

    pub async fn invalidate_namespace(&self, namespace: &[String]) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !key.in_namespace(namespace));
        before - entries.len()
    }

    pub async fn purge_expired(&self, cache_time: Duration) -> usize {
        evict_expired(&mut *self.entries.lock().await, cache_time)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Runs `make` for `key` unless a request for the same key is already in
    /// flight, in which case the caller waits on that request instead.
    pub async fn fetch_deduped<F>(&self, key: &CacheKey, make: F) -> FetchOutcome<T>
    where
        F: FnOnce() -> BoxFuture<'static, FetchOutcome<T>>,
    {
        let shared = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(key) {
                Some(existing) => {
                    debug!(page = key.page, search = %key.search, "pagination: joining in-flight request");
                    existing.clone()
                }
                None => {
                    let fresh = make().shared();
                    inflight.insert(key.clone(), fresh.clone());
                    fresh
                }
            }
        };

        let outcome = shared.clone().await;

        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(key)
            .is_some_and(|current| current.ptr_eq(&shared))
        {
            inflight.remove(key);
        }
        outcome
    }
}

fn evict_expired<T>(
    entries: &mut HashMap<CacheKey, CacheEntry<T>>,
    cache_time: Duration,
) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(cache_time));
    before - entries.len()
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
