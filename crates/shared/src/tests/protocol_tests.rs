use super::*;
use crate::error::PageErrorKind;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Product {
    id: String,
    title: String,
}

fn envelope(value: Value) -> PageEnvelope {
    serde_json::from_value(value).expect("envelope")
}

#[test]
fn parses_full_page_payload() {
    let env = envelope(json!({
        "success": true,
        "data": {
            "products": [
                { "id": "p1", "title": "Shirt" },
                { "id": "p2", "title": "Hat" }
            ],
            "total": 120,
            "page": 1,
            "pageSize": 50,
            "totalPages": 3,
            "hasMore": true,
            "hasPrevious": false
        }
    }));

    let result: PageResult<Product> = env
        .into_page_result("products", &PageRequest::new(1, 50))
        .expect("page result");

    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[1].title, "Hat");
    assert_eq!(result.total, 120);
    assert_eq!(result.total_pages, 3);
    assert!(result.has_more);
    assert!(!result.has_previous);
}

#[test]
fn derives_absent_navigation_fields_from_request() {
    let env = envelope(json!({
        "success": true,
        "data": { "items": [], "total": 75 }
    }));

    let result: PageResult<Product> = env
        .into_page_result("items", &PageRequest::new(2, 25))
        .expect("page result");

    assert_eq!(result.page, 2);
    assert_eq!(result.page_size, 25);
    assert_eq!(result.total_pages, 3);
    assert!(result.has_more);
    assert!(result.has_previous);
}

#[test]
fn server_reported_failure_is_classified() {
    let env = envelope(json!({
        "success": false,
        "error": "No Shopify store connected. Please connect your store first."
    }));

    let err = env
        .into_page_result::<Product>("products", &PageRequest::new(1, 50))
        .expect_err("failure");
    assert_eq!(err.kind, PageErrorKind::NotConnected);
    assert!(err.message.starts_with("No Shopify store connected"));
}

#[test]
fn failure_without_message_is_generic_server_error() {
    let err = envelope(json!({ "success": false }))
        .into_page_result::<Product>("products", &PageRequest::new(1, 50))
        .expect_err("failure");
    assert_eq!(err.kind, PageErrorKind::Server);
}

#[test]
fn missing_total_is_malformed() {
    let err = envelope(json!({
        "success": true,
        "data": { "products": [] }
    }))
    .into_page_result::<Product>("products", &PageRequest::new(1, 50))
    .expect_err("malformed");
    assert_eq!(err.kind, PageErrorKind::MalformedResponse);
    assert!(err.message.contains("total"));
}

#[test]
fn missing_items_field_is_malformed() {
    let err = envelope(json!({
        "success": true,
        "data": { "orders": [], "total": 0 }
    }))
    .into_page_result::<Product>("products", &PageRequest::new(1, 50))
    .expect_err("malformed");
    assert_eq!(err.kind, PageErrorKind::MalformedResponse);
    assert!(err.message.contains("products"));
}

#[test]
fn mistyped_items_are_malformed() {
    let err = envelope(json!({
        "success": true,
        "data": { "products": [{ "id": 7 }], "total": 1 }
    }))
    .into_page_result::<Product>("products", &PageRequest::new(1, 50))
    .expect_err("malformed");
    assert_eq!(err.kind, PageErrorKind::MalformedResponse);
}

#[test]
fn missing_data_is_malformed() {
    let err = envelope(json!({ "success": true }))
        .into_page_result::<Product>("products", &PageRequest::new(1, 50))
        .expect_err("malformed");
    assert_eq!(err.kind, PageErrorKind::MalformedResponse);
}

#[test]
fn zero_page_size_in_payload_is_malformed() {
    let err = envelope(json!({
        "success": true,
        "data": { "products": [], "total": 0, "pageSize": 0 }
    }))
    .into_page_result::<Product>("products", &PageRequest::new(1, 50))
    .expect_err("malformed");
    assert_eq!(err.kind, PageErrorKind::MalformedResponse);
}

#[test]
fn parses_cursor_slice() {
    let env = envelope(json!({
        "success": true,
        "data": {
            "orders": [{ "id": "o1", "title": "#1001" }],
            "pageInfo": { "hasNextPage": true, "endCursor": "abc" }
        }
    }));

    let slice: CursorPage<Product> = env.into_cursor_page("orders").expect("cursor page");
    assert_eq!(slice.items.len(), 1);
    assert_eq!(slice.total, 1);
    assert_eq!(slice.end_cursor.as_deref(), Some("abc"));
    assert!(slice.has_next_page);
}

#[test]
fn cursor_slice_without_page_info_is_malformed() {
    let err = envelope(json!({
        "success": true,
        "data": { "orders": [], "total": 0 }
    }))
    .into_cursor_page::<Product>("orders")
    .expect_err("malformed");
    assert_eq!(err.kind, PageErrorKind::MalformedResponse);
}
