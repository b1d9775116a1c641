use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use shared::{
    domain::{CacheKey, PageRequest, PageResult, DEFAULT_PAGE_SIZE},
    error::PageError,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheEntry, QueryCache, DEFAULT_CACHE_TIME},
    retry::{classify_failure, RetryPolicy},
    PageFetcher,
};

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub namespace: Vec<String>,
    pub page_size: u32,
    pub enabled: bool,
    pub initial_page: u32,
    pub initial_search: String,
    pub stale_time: Duration,
    pub cache_time: Duration,
    pub filters: BTreeMap<String, String>,
    pub retry: RetryPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            namespace: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            enabled: true,
            initial_page: 1,
            initial_search: String::new(),
            stale_time: Duration::ZERO,
            cache_time: DEFAULT_CACHE_TIME,
            filters: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerOptions {
    pub fn new<I, S>(namespace: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Seeds the view position, e.g. when returning to a list the user left.
    pub fn with_initial_page(mut self, page: u32) -> Self {
        self.initial_page = page.max(1);
        self
    }

    pub fn with_initial_search(mut self, search: impl Into<String>) -> Self {
        self.initial_search = search.into();
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Loaded { key: CacheKey, total: u64 },
    Failed { key: CacheKey, error: PageError },
    StaleDiscarded { key: CacheKey },
}

/// Read-only view of the controller, with safe defaults before the first
/// result arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub current_page: u32,
    pub page_size: u32,
    pub search_query: String,
    pub is_loading: bool,
    pub is_fetching: bool,
    pub is_retrying: bool,
    /// A fetch started by `search`/`clear_search` is still running.
    pub is_searching: bool,
    pub error: Option<PageError>,
    pub updated_at: Option<DateTime<Utc>>,
}

struct ControllerState<T> {
    current_page: u32,
    page_size: u32,
    search_query: String,
    enabled: bool,
    last_result: Option<Arc<PageResult<T>>>,
    result_key: Option<CacheKey>,
    last_error: Option<PageError>,
    updated_at: Option<DateTime<Utc>>,
    searching: bool,
    next_fetch_id: u64,
    committed_fetch_id: u64,
}

impl<T> ControllerState<T> {
    fn key(&self, namespace: &[String]) -> CacheKey {
        CacheKey::new(
            namespace.to_vec(),
            self.current_page,
            self.page_size,
            self.search_query.clone(),
        )
    }

    // A result reporting zero pages still renders as a single empty page.
    fn total_pages(&self) -> u32 {
        self.last_result
            .as_ref()
            .map_or(1, |result| result.total_pages.max(1))
    }

    fn has_more(&self) -> bool {
        self.last_result
            .as_ref()
            .is_some_and(|result| result.has_more)
    }

    fn move_to_page(&mut self, page: u32) -> bool {
        if page < 1 || page > self.total_pages() || page == self.current_page {
            return false;
        }
        self.current_page = page;
        self.searching = false;
        true
    }

    fn apply_result(&mut self, key: &CacheKey, entry: &CacheEntry<T>) {
        self.last_result = Some(Arc::clone(&entry.result));
        self.result_key = Some(key.clone());
        self.last_error = None;
        self.updated_at = Some(entry.updated_at);
        self.searching = false;
    }
}

/// Fetches in flight per key. Kept outside the async state lock so a
/// dropped fetch can release its slot from `Drop`.
#[derive(Default)]
struct FetchTracker {
    inflight: HashMap<CacheKey, usize>,
    retrying: HashSet<CacheKey>,
}

impl FetchTracker {
    fn is_fetching(&self, key: &CacheKey) -> bool {
        self.inflight.contains_key(key)
    }
}

struct InflightGuard<'a> {
    tracker: &'a StdMutex<FetchTracker>,
    key: CacheKey,
}

impl<'a> InflightGuard<'a> {
    fn register(tracker: &'a StdMutex<FetchTracker>, key: CacheKey) -> Self {
        *lock_tracker(tracker).inflight.entry(key.clone()).or_default() += 1;
        Self { tracker, key }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut tracker = lock_tracker(self.tracker);
        if let Some(count) = tracker.inflight.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                tracker.inflight.remove(&self.key);
                tracker.retrying.remove(&self.key);
            }
        }
    }
}

fn lock_tracker(tracker: &StdMutex<FetchTracker>) -> MutexGuard<'_, FetchTracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks page, page size and search query for one list view and keeps the
/// most recent result for that position, fetched through a [`PageFetcher`].
pub struct PageFetchController<T> {
    fetcher: Arc<dyn PageFetcher<T>>,
    cache: Arc<QueryCache<T>>,
    namespace: Vec<String>,
    filters: BTreeMap<String, String>,
    stale_time: Duration,
    cache_time: Duration,
    retry: RetryPolicy,
    state: Mutex<ControllerState<T>>,
    tracker: StdMutex<FetchTracker>,
    events: broadcast::Sender<PageEvent>,
}

impl<T: Clone + Send + Sync + 'static> PageFetchController<T> {
    pub fn new(fetcher: Arc<dyn PageFetcher<T>>, options: ControllerOptions) -> Arc<Self> {
        Self::with_cache(fetcher, QueryCache::new(), options)
    }

    pub fn with_cache(
        fetcher: Arc<dyn PageFetcher<T>>,
        cache: Arc<QueryCache<T>>,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            fetcher,
            cache,
            namespace: options.namespace,
            filters: options.filters,
            stale_time: options.stale_time,
            cache_time: options.cache_time,
            retry: options.retry,
            state: Mutex::new(ControllerState {
                current_page: options.initial_page.max(1),
                page_size: options.page_size.max(1),
                search_query: options.initial_search,
                enabled: options.enabled,
                last_result: None,
                result_key: None,
                last_error: None,
                updated_at: None,
                searching: false,
                next_fetch_id: 0,
                committed_fetch_id: 0,
            }),
            tracker: StdMutex::new(FetchTracker::default()),
            events,
        })
    }

    /// Fetches the current position unless a fresh cached result exists.
    pub async fn load(&self) {
        self.sync().await;
    }

    pub async fn go_to_page(&self, page: u32) {
        {
            let mut state = self.state.lock().await;
            if !state.move_to_page(page) {
                debug!(
                    page,
                    total_pages = state.total_pages(),
                    "pagination: ignoring out-of-range page"
                );
                return;
            }
        }
        self.sync().await;
    }

    pub async fn next_page(&self) {
        {
            let mut state = self.state.lock().await;
            if !state.has_more() {
                return;
            }
            let target = state.current_page.saturating_add(1);
            if !state.move_to_page(target) {
                return;
            }
        }
        self.sync().await;
    }

    pub async fn previous_page(&self) {
        {
            let mut state = self.state.lock().await;
            if state.current_page <= 1 {
                return;
            }
            let target = state.current_page - 1;
            if !state.move_to_page(target) {
                return;
            }
        }
        self.sync().await;
    }

    /// A new query changes the result set, so the view returns to page 1.
    pub async fn search(&self, query: &str) {
        {
            let mut state = self.state.lock().await;
            let changed = state.search_query != query || state.current_page != 1;
            state.search_query = query.to_string();
            state.current_page = 1;
            if !changed {
                return;
            }
            state.searching = true;
        }
        self.sync().await;
    }

    pub async fn clear_search(&self) {
        self.search("").await;
    }

    pub async fn change_page_size(&self, page_size: u32) {
        if page_size < 1 {
            return;
        }
        {
            let mut state = self.state.lock().await;
            let changed = state.page_size != page_size || state.current_page != 1;
            state.page_size = page_size;
            state.current_page = 1;
            state.searching = false;
            if !changed {
                return;
            }
        }
        self.sync().await;
    }

    /// Re-fetches the current position regardless of staleness and reports
    /// how that fetch ended.
    pub async fn refresh(&self) -> Result<(), PageError> {
        let (key, request) = {
            let state = self.state.lock().await;
            (state.key(&self.namespace), self.build_request(&state))
        };
        self.execute(key, request).await
    }

    pub async fn set_enabled(&self, enabled: bool) {
        let was_enabled = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut state.enabled, enabled)
        };
        if enabled && !was_enabled {
            self.sync().await;
        }
    }

    pub async fn snapshot(&self) -> PageSnapshot<T> {
        let state = self.state.lock().await;
        let key = state.key(&self.namespace);
        let result = state.last_result.as_deref();
        let (is_fetching, is_retrying) = {
            let tracker = lock_tracker(&self.tracker);
            (tracker.is_fetching(&key), tracker.retrying.contains(&key))
        };

        PageSnapshot {
            items: result.map(|r| r.items.clone()).unwrap_or_default(),
            total: result.map_or(0, |r| r.total),
            total_pages: state.total_pages(),
            has_next_page: result.is_some_and(|r| r.has_more),
            has_previous_page: result.is_some_and(|r| r.has_previous),
            current_page: state.current_page,
            page_size: state.page_size,
            search_query: state.search_query.clone(),
            is_loading: is_fetching && state.result_key.as_ref() != Some(&key),
            is_fetching,
            is_retrying,
            is_searching: state.searching && is_fetching,
            error: state.last_error.clone(),
            updated_at: state.updated_at,
        }
    }

    pub async fn current_page(&self) -> u32 {
        self.state.lock().await.current_page
    }

    pub async fn cache_key(&self) -> CacheKey {
        self.state.lock().await.key(&self.namespace)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    fn build_request(&self, state: &ControllerState<T>) -> PageRequest {
        PageRequest::new(state.current_page, state.page_size)
            .with_search(&state.search_query)
            .with_filters(self.filters.clone())
    }

    async fn sync(&self) {
        let (key, request) = {
            let state = self.state.lock().await;
            if !state.enabled {
                debug!("pagination: controller disabled; skipping fetch");
                return;
            }
            (state.key(&self.namespace), self.build_request(&state))
        };

        if let Some(entry) = self.cache.lookup(&key, self.cache_time).await {
            let fresh = !entry.is_stale(self.stale_time);
            {
                let mut state = self.state.lock().await;
                if state.key(&self.namespace) == key {
                    state.apply_result(&key, &entry);
                }
            }
            if fresh {
                debug!(
                    page = key.page,
                    search = %key.search,
                    "pagination: serving fresh cached page"
                );
                return;
            }
        }

        // Failures are recorded in state; callers read them from the snapshot.
        let _ = self.execute(key, request).await;
    }

    async fn execute(&self, key: CacheKey, request: PageRequest) -> Result<(), PageError> {
        let fetch_id = {
            let mut state = self.state.lock().await;
            state.next_fetch_id += 1;
            state.next_fetch_id
        };
        let inflight = InflightGuard::register(&self.tracker, key.clone());

        let outcome = self.fetch_with_retry(&key, &request).await;

        let mut state = self.state.lock().await;
        drop(inflight);

        let still_current =
            state.key(&self.namespace) == key && fetch_id > state.committed_fetch_id;
        if !still_current {
            drop(state);
            debug!(
                page = key.page,
                search = %key.search,
                fetch_id,
                "pagination: discarding response for superseded request"
            );
            let _ = self.events.send(PageEvent::StaleDiscarded { key });
            return outcome.map(|_| ());
        }

        state.committed_fetch_id = fetch_id;
        state.searching = false;
        match outcome {
            Ok(entry) => {
                state.apply_result(&key, &entry);
                drop(state);
                info!(
                    page = key.page,
                    page_size = key.page_size,
                    search = %key.search,
                    total = entry.result.total,
                    "pagination: page loaded"
                );
                let _ = self.events.send(PageEvent::Loaded {
                    key,
                    total: entry.result.total,
                });
                Ok(())
            }
            Err(error) => {
                // Keep the last good page visible next to the error.
                state.last_error = Some(error.clone());
                drop(state);
                warn!(
                    page = key.page,
                    search = %key.search,
                    kind = ?error.kind,
                    "pagination: fetch failed: {error}"
                );
                let _ = self.events.send(PageEvent::Failed {
                    key,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        key: &CacheKey,
        request: &PageRequest,
    ) -> Result<CacheEntry<T>, PageError> {
        let mut failures = 0;
        loop {
            let fetcher = Arc::clone(&self.fetcher);
            let attempt_request = request.clone();
            let outcome = self
                .cache
                .fetch_deduped(key, move || {
                    async move {
                        fetcher
                            .fetch_page(attempt_request)
                            .await
                            .map(Arc::new)
                            .map_err(|err| classify_failure(&err))
                    }
                    .boxed()
                })
                .await;

            let error = match outcome {
                Ok(result) => {
                    return Ok(self
                        .cache
                        .insert(key.clone(), result, self.cache_time)
                        .await)
                }
                Err(error) => error,
            };

            if !self.retry.should_retry(failures, &error) {
                return Err(error);
            }
            if !self.is_current(key).await {
                debug!(
                    page = key.page,
                    search = %key.search,
                    "pagination: position moved on; abandoning retries"
                );
                return Err(error);
            }

            let delay = self.retry.delay_for(failures);
            warn!(
                page = key.page,
                search = %key.search,
                attempt = failures + 1,
                max_retries = self.retry.max_retries,
                ?delay,
                "pagination: fetch failed; retrying: {error}"
            );
            lock_tracker(&self.tracker).retrying.insert(key.clone());
            tokio::time::sleep(delay).await;
            failures += 1;
        }
    }

    async fn is_current(&self, key: &CacheKey) -> bool {
        self.state.lock().await.key(&self.namespace) == *key
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
