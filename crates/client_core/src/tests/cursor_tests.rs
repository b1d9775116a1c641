use super::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::error::PageErrorKind;
use tokio::sync::Notify;

struct OrderFeed {
    total: u32,
    requests: Mutex<Vec<CursorRequest>>,
    fail_with: Mutex<Option<String>>,
    hold_after: Mutex<Option<String>>,
    gate: Notify,
}

impl OrderFeed {
    fn with_total(total: u32) -> Arc<Self> {
        Arc::new(Self {
            total,
            requests: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            hold_after: Mutex::new(None),
            gate: Notify::new(),
        })
    }

    async fn requests(&self) -> Vec<CursorRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl CursorFetcher<u32> for OrderFeed {
    async fn fetch_slice(&self, request: CursorRequest) -> Result<CursorPage<u32>> {
        self.requests.lock().await.push(request.clone());
        if let Some(message) = self.fail_with.lock().await.clone() {
            return Err(anyhow!(message));
        }
        if request.after.is_some() && *self.hold_after.lock().await == request.after {
            self.gate.notified().await;
        }

        let start: u32 = match &request.after {
            Some(cursor) => cursor.parse()?,
            None => 0,
        };
        let end = (start + request.limit).min(self.total);
        Ok(CursorPage {
            items: (start + 1..=end).collect(),
            total: u64::from(self.total),
            end_cursor: (end > start).then(|| end.to_string()),
            has_next_page: end < self.total,
        })
    }
}

fn feed(fetcher: &Arc<OrderFeed>) -> Arc<LoadMoreController<u32>> {
    LoadMoreController::<u32>::new(
        fetcher.clone(),
        LoadMoreOptions {
            initial_limit: 2,
            load_more_limit: 3,
            ..LoadMoreOptions::default()
        },
    )
}

#[tokio::test]
async fn accumulates_slices_until_exhausted() {
    let fetcher = OrderFeed::with_total(7);
    let feed = feed(&fetcher);

    feed.load().await;
    let first = feed.snapshot().await;
    assert_eq!(first.items, vec![1, 2]);
    assert!(first.can_load_more);
    assert_eq!(first.current_cursor.as_deref(), Some("2"));

    feed.load_more().await;
    feed.load_more().await;
    let done = feed.snapshot().await;
    assert_eq!(done.items, (1..=7).collect::<Vec<_>>());
    assert!(!done.has_more);
    assert!(!done.can_load_more);
    assert_eq!(done.total, 7);

    feed.load_more().await;
    assert_eq!(fetcher.requests().await.len(), 3);

    let requests = fetcher.requests().await;
    assert_eq!(requests[0].limit, 2);
    assert_eq!(requests[1].limit, 3);
    assert_eq!(requests[1].after.as_deref(), Some("2"));
}

#[tokio::test]
async fn load_more_before_first_slice_is_a_no_op() {
    let fetcher = OrderFeed::with_total(7);
    let feed = feed(&fetcher);

    feed.load_more().await;
    assert!(fetcher.requests().await.is_empty());
}

#[tokio::test]
async fn search_restarts_the_feed() {
    let fetcher = OrderFeed::with_total(7);
    let feed = feed(&fetcher);
    feed.load().await;
    feed.load_more().await;

    feed.search("#1001").await;
    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.items, vec![1, 2]);
    assert_eq!(snapshot.search_query, "#1001");

    let last = fetcher.requests().await.pop().expect("request");
    assert_eq!(last.search.as_deref(), Some("#1001"));
    assert_eq!(last.after, None);

    feed.clear_search().await;
    let last = fetcher.requests().await.pop().expect("request");
    assert_eq!(last.search, None);
}

#[tokio::test]
async fn refresh_keeps_query_and_reset_clears_it() {
    let fetcher = OrderFeed::with_total(7);
    let feed = feed(&fetcher);
    feed.search("late").await;
    feed.load_more().await;

    feed.refresh().await;
    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.items, vec![1, 2]);
    assert_eq!(snapshot.search_query, "late");

    feed.reset().await;
    let snapshot = feed.snapshot().await;
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.search_query, "");
    assert!(snapshot.current_cursor.is_none());
}

#[tokio::test]
async fn slice_for_a_reset_feed_is_dropped() {
    let fetcher = OrderFeed::with_total(7);
    let feed = feed(&fetcher);
    feed.load().await;
    *fetcher.hold_after.lock().await = Some("2".to_string());

    tokio::join!(feed.load_more(), async {
        tokio::task::yield_now().await;
        assert!(feed.snapshot().await.is_loading_more);
        feed.reset().await;
        fetcher.gate.notify_one();
    });

    let snapshot = feed.snapshot().await;
    assert!(snapshot.items.is_empty());
    assert!(!snapshot.is_loading_more);
}

#[tokio::test]
async fn failures_keep_accumulated_items() {
    let fetcher = OrderFeed::with_total(7);
    let feed = feed(&fetcher);
    feed.load().await;

    *fetcher.fail_with.lock().await = Some("Request timeout".to_string());
    feed.load_more().await;

    let snapshot = feed.snapshot().await;
    assert_eq!(snapshot.items, vec![1, 2]);
    assert_eq!(
        snapshot.error.map(|err| err.kind),
        Some(PageErrorKind::Timeout)
    );
    assert!(snapshot.can_load_more);
}

#[tokio::test]
async fn disabled_feed_does_not_fetch() {
    let fetcher = OrderFeed::with_total(7);
    let feed = LoadMoreController::<u32>::new(
        fetcher.clone(),
        LoadMoreOptions {
            enabled: false,
            ..LoadMoreOptions::default()
        },
    );

    feed.load().await;
    assert!(fetcher.requests().await.is_empty());
}
