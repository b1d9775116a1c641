use std::{collections::BTreeMap, sync::Arc};

use shared::{
    domain::{CursorPage, CursorRequest, DEFAULT_LOAD_MORE_LIMIT, DEFAULT_PAGE_SIZE},
    error::PageError,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{retry::classify_failure, CursorFetcher};

#[derive(Debug, Clone)]
pub struct LoadMoreOptions {
    pub initial_limit: u32,
    pub load_more_limit: u32,
    pub enabled: bool,
    pub filters: BTreeMap<String, String>,
}

impl Default for LoadMoreOptions {
    fn default() -> Self {
        Self {
            initial_limit: DEFAULT_PAGE_SIZE,
            load_more_limit: DEFAULT_LOAD_MORE_LIMIT,
            enabled: true,
            filters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub has_more: bool,
    pub can_load_more: bool,
    pub current_cursor: Option<String>,
    pub search_query: String,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub error: Option<PageError>,
}

struct FeedState<T> {
    items: Vec<T>,
    total: u64,
    cursor: Option<String>,
    has_more: bool,
    search: String,
    generation: u64,
    loading: bool,
    loading_more: bool,
    error: Option<PageError>,
}

impl<T> FeedState<T> {
    fn restart(&mut self, search: String) -> u64 {
        self.items.clear();
        self.total = 0;
        self.cursor = None;
        self.has_more = true;
        self.search = search;
        self.loading = false;
        self.loading_more = false;
        self.error = None;
        self.generation += 1;
        self.generation
    }

    fn request(&self, limit: u32, filters: &BTreeMap<String, String>) -> CursorRequest {
        CursorRequest {
            limit,
            after: None,
            search: (!self.search.is_empty()).then(|| self.search.clone()),
            filters: filters.clone(),
        }
    }
}

/// Accumulating "load more" list driven by opaque cursors.
pub struct LoadMoreController<T> {
    fetcher: Arc<dyn CursorFetcher<T>>,
    options: LoadMoreOptions,
    state: Mutex<FeedState<T>>,
}

impl<T: Clone + Send + Sync + 'static> LoadMoreController<T> {
    pub fn new(fetcher: Arc<dyn CursorFetcher<T>>, options: LoadMoreOptions) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            options,
            state: Mutex::new(FeedState {
                items: Vec::new(),
                total: 0,
                cursor: None,
                has_more: true,
                search: String::new(),
                generation: 0,
                loading: false,
                loading_more: false,
                error: None,
            }),
        })
    }

    /// Loads the first slice and replaces whatever was accumulated.
    pub async fn load(&self) {
        if !self.options.enabled {
            return;
        }
        let (generation, request) = {
            let mut state = self.state.lock().await;
            state.loading = true;
            (
                state.generation,
                state.request(self.options.initial_limit, &self.options.filters),
            )
        };

        let outcome = self.fetcher.fetch_slice(request).await;
        self.apply(generation, outcome, false).await;
    }

    pub async fn load_more(&self) {
        let (generation, request) = {
            let mut state = self.state.lock().await;
            let Some(cursor) = state.cursor.clone() else {
                return;
            };
            if state.loading || state.loading_more || !state.has_more {
                return;
            }
            state.loading_more = true;
            let mut request = state.request(self.options.load_more_limit, &self.options.filters);
            request.after = Some(cursor);
            (state.generation, request)
        };

        let outcome = self.fetcher.fetch_slice(request).await;
        self.apply(generation, outcome, true).await;
    }

    pub async fn search(&self, query: &str) {
        self.state.lock().await.restart(query.to_string());
        self.load().await;
    }

    pub async fn clear_search(&self) {
        self.search("").await;
    }

    pub async fn refresh(&self) {
        {
            let mut state = self.state.lock().await;
            let search = std::mem::take(&mut state.search);
            state.restart(search);
        }
        self.load().await;
    }

    /// Clears accumulated items and the query without reloading.
    pub async fn reset(&self) {
        self.state.lock().await.restart(String::new());
    }

    pub async fn snapshot(&self) -> FeedSnapshot<T> {
        let state = self.state.lock().await;
        FeedSnapshot {
            items: state.items.clone(),
            total: state.total,
            has_more: state.has_more,
            can_load_more: state.has_more
                && state.cursor.is_some()
                && !state.loading
                && !state.loading_more,
            current_cursor: state.cursor.clone(),
            search_query: state.search.clone(),
            is_loading: state.loading,
            is_loading_more: state.loading_more,
            error: state.error.clone(),
        }
    }

    async fn apply(&self, generation: u64, outcome: anyhow::Result<CursorPage<T>>, append: bool) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(generation, "pagination: discarding slice for a reset feed");
            return;
        }
        if append {
            state.loading_more = false;
        } else {
            state.loading = false;
        }

        match outcome {
            Ok(slice) => {
                info!(
                    received = slice.items.len(),
                    has_next_page = slice.has_next_page,
                    "pagination: feed slice loaded"
                );
                if append {
                    state.items.extend(slice.items);
                } else {
                    state.items = slice.items;
                }
                state.total = slice.total;
                state.has_more = slice.has_next_page;
                state.cursor = slice.end_cursor;
                state.error = None;
            }
            Err(err) => {
                let error = classify_failure(&err);
                warn!(kind = ?error.kind, "pagination: feed slice failed: {error}");
                state.error = Some(error);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/cursor_tests.rs"]
mod tests;
