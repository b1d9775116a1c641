use super::*;
use shared::error::{PageError, PageErrorKind};

fn snapshot(error: Option<PageError>) -> PageSnapshot<Value> {
    PageSnapshot {
        items: vec![json!({ "id": "p1" })],
        total: 1,
        total_pages: 1,
        has_next_page: false,
        has_previous_page: false,
        current_page: 1,
        page_size: 50,
        search_query: String::new(),
        is_loading: false,
        is_fetching: false,
        is_retrying: false,
        is_searching: false,
        error,
        updated_at: None,
    }
}

#[test]
fn failed_page_returns_the_notice_as_an_error() {
    let failed = snapshot(Some(PageError::new(
        PageErrorKind::Unauthorized,
        "unauthorized",
    )));
    let err = ensure_loaded(&failed).expect_err("failure");
    assert_eq!(
        err.to_string(),
        "Authentication Error: Please log in again to continue."
    );
}

#[test]
fn loaded_page_renders_metadata_and_items() {
    let loaded = snapshot(None);
    ensure_loaded(&loaded).expect("loaded");

    let rendered = render_page(&loaded);
    assert_eq!(rendered["page"], 1);
    assert_eq!(rendered["items"][0]["id"], "p1");
    assert_eq!(rendered["updatedAt"], Value::Null);
}
