use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_LOAD_MORE_LIMIT: u32 = 100;

/// Identifies one cached page: the caller's namespace followed by the
/// page, page size and search query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: Vec<String>,
    pub page: u32,
    pub page_size: u32,
    pub search: String,
}

impl CacheKey {
    pub fn new(
        namespace: Vec<String>,
        page: u32,
        page_size: u32,
        search: impl Into<String>,
    ) -> Self {
        Self {
            namespace,
            page,
            page_size,
            search: search.into(),
        }
    }

    pub fn in_namespace(&self, namespace: &[String]) -> bool {
        self.namespace.starts_with(namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    #[serde(rename = "limit")]
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(flatten)]
    pub filters: BTreeMap<String, String>,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            search: None,
            filters: BTreeMap::new(),
        }
    }

    /// An empty query is treated as "no search".
    pub fn with_search(mut self, search: &str) -> Self {
        self.search = (!search.is_empty()).then(|| search.to_string());
        self
    }

    pub fn with_filters(mut self, filters: BTreeMap<String, String>) -> Self {
        self.filters = filters;
        self
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.page_size.to_string()),
        ];
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        pairs.extend(
            self.filters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_more: bool,
    pub has_previous: bool,
}

impl<T> PageResult<T> {
    /// Builds a result whose page count and navigation flags are derived
    /// from `total` and `page_size`.
    pub fn new(items: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        let total_pages = total_pages_for(total, page_size);
        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
            has_more: page < total_pages,
            has_previous: page > 1,
        }
    }
}

pub fn total_pages_for(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 1;
    }
    u32::try_from(total.div_ceil(u64::from(page_size))).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRequest {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(flatten)]
    pub filters: BTreeMap<String, String>,
}

impl CursorRequest {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("limit".to_string(), self.limit.to_string())];
        if let Some(after) = &self.after {
            pairs.push(("after".to_string(), after.clone()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        pairs.extend(
            self.filters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}
