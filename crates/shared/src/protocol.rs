use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{total_pages_for, CursorPage, PageRequest, PageResult},
    error::PageError,
};

/// Response envelope returned by the admin REST endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl PageEnvelope {
    pub fn into_page_result<T: DeserializeOwned>(
        self,
        items_field: &str,
        request: &PageRequest,
    ) -> Result<PageResult<T>, PageError> {
        let data = self.into_data()?;
        let items = items_from(&data, items_field)?;
        let total = required_u64(&data, "total")?;

        let page = optional_u32(&data, "page")?.unwrap_or(request.page);
        let page_size = optional_u32(&data, "pageSize")?.unwrap_or(request.page_size);
        if page == 0 {
            return Err(PageError::malformed("`page` must be at least 1"));
        }
        if page_size == 0 {
            return Err(PageError::malformed("`pageSize` must be at least 1"));
        }

        let total_pages =
            optional_u32(&data, "totalPages")?.unwrap_or_else(|| total_pages_for(total, page_size));
        let has_more = optional_bool(&data, "hasMore")?.unwrap_or(page < total_pages);
        let has_previous = optional_bool(&data, "hasPrevious")?.unwrap_or(page > 1);

        Ok(PageResult {
            items,
            total,
            page,
            page_size,
            total_pages,
            has_more,
            has_previous,
        })
    }

    pub fn into_cursor_page<T: DeserializeOwned>(
        self,
        items_field: &str,
    ) -> Result<CursorPage<T>, PageError> {
        let data = self.into_data()?;
        let items: Vec<T> = items_from(&data, items_field)?;
        let total = match data.get("total") {
            None | Some(Value::Null) => items.len() as u64,
            Some(_) => required_u64(&data, "total")?,
        };

        let page_info = match data.get("pageInfo") {
            Some(Value::Object(info)) => info,
            _ => return Err(PageError::malformed("response is missing `pageInfo`")),
        };
        let has_next_page = match page_info.get("hasNextPage") {
            Some(Value::Bool(flag)) => *flag,
            _ => {
                return Err(PageError::malformed(
                    "`pageInfo.hasNextPage` must be a boolean",
                ))
            }
        };
        let end_cursor = match page_info.get("endCursor") {
            None | Some(Value::Null) => None,
            Some(Value::String(cursor)) => Some(cursor.clone()),
            Some(_) => {
                return Err(PageError::malformed(
                    "`pageInfo.endCursor` must be a string",
                ))
            }
        };

        Ok(CursorPage {
            items,
            total,
            end_cursor,
            has_next_page,
        })
    }

    fn into_data(self) -> Result<Map<String, Value>, PageError> {
        if !self.success {
            return Err(PageError::classify(
                self.error.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        match self.data {
            Some(Value::Object(data)) => Ok(data),
            Some(_) => Err(PageError::malformed("`data` must be an object")),
            None => Err(PageError::malformed("response is missing `data`")),
        }
    }
}

fn items_from<T: DeserializeOwned>(
    data: &Map<String, Value>,
    items_field: &str,
) -> Result<Vec<T>, PageError> {
    match data.get(items_field) {
        Some(items @ Value::Array(_)) => serde_json::from_value(items.clone()).map_err(|err| {
            PageError::malformed(format!("invalid `{items_field}` entries: {err}"))
        }),
        Some(_) => Err(PageError::malformed(format!(
            "`{items_field}` must be an array"
        ))),
        None => Err(PageError::malformed(format!(
            "response is missing `{items_field}`"
        ))),
    }
}

fn required_u64(data: &Map<String, Value>, field: &str) -> Result<u64, PageError> {
    data.get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| PageError::malformed(format!("`{field}` must be a non-negative integer")))
}

fn optional_u32(data: &Map<String, Value>, field: &str) -> Result<Option<u32>, PageError> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|raw| u32::try_from(raw).ok())
            .map(Some)
            .ok_or_else(|| PageError::malformed(format!("`{field}` must be a page number"))),
    }
}

fn optional_bool(data: &Map<String, Value>, field: &str) -> Result<Option<bool>, PageError> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(PageError::malformed(format!("`{field}` must be a boolean"))),
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
