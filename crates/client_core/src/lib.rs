use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{CursorPage, CursorRequest, PageRequest, PageResult};

pub mod cache;
pub mod controller;
pub mod cursor;
pub mod http;
pub mod retry;
pub mod session;

pub use cache::QueryCache;
pub use controller::{ControllerOptions, PageEvent, PageFetchController, PageSnapshot};
pub use cursor::{FeedSnapshot, LoadMoreController, LoadMoreOptions};
pub use http::HttpPageFetcher;
pub use retry::RetryPolicy;
pub use session::SessionContext;

/// Data source for page-numbered lists. Errors should carry a readable
/// message; a returned `PageError` is used as-is, anything else is
/// classified by its message.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, request: PageRequest) -> Result<PageResult<T>>;
}

#[async_trait]
pub trait CursorFetcher<T>: Send + Sync {
    async fn fetch_slice(&self, request: CursorRequest) -> Result<CursorPage<T>>;
}
