use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CursorPage, CursorRequest, PageRequest, PageResult},
    error::{PageError, PageErrorKind},
    protocol::PageEnvelope,
};
use tracing::{debug, info};
use url::Url;

use crate::{session::SessionContext, CursorFetcher, PageFetcher};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// REST collaborator for one list endpoint, e.g. `GET /shopify/products`.
pub struct HttpPageFetcher {
    http: Client,
    base_url: Url,
    endpoint: Url,
    items_field: String,
    session: Arc<SessionContext>,
}

impl HttpPageFetcher {
    pub fn new(
        base_url: &str,
        resource_path: &str,
        items_field: impl Into<String>,
        timeout: Duration,
        session: Arc<SessionContext>,
    ) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;
        let endpoint = join_path(&base_url, resource_path)?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            endpoint,
            items_field: items_field.into(),
            session,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Asks the backend to import the resource before it is paged, as list
    /// views do right after a store is linked.
    pub async fn trigger_sync(&self, sync_path: &str) -> Result<()> {
        let url = join_path(&self.base_url, sync_path)?;
        let request = self.authorize(self.http.post(url.clone())).await;
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.revoke_token().await;
            return Err(unauthorized().into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PageError::classify(error_message(status, &body))).context(format!(
                "sync request to {url} failed"
            ));
        }
        info!(url = %url, "pagination: sync request accepted");
        Ok(())
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_envelope(&self, query: Vec<(String, String)>) -> Result<PageEnvelope> {
        debug!(endpoint = %self.endpoint, ?query, "pagination: requesting page");
        let request = self
            .authorize(self.http.get(self.endpoint.clone()).query(&query))
            .await;
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.session.revoke_token().await;
            return Err(unauthorized().into());
        }
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(PageError::new(
                PageErrorKind::Timeout,
                format!("request timeout ({status})"),
            )
            .into());
        }

        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(PageError::classify(error_message(status, &body)).into());
        }
        serde_json::from_str(&body)
            .map_err(|err| PageError::malformed(format!("invalid response body: {err}")).into())
    }
}

#[async_trait]
impl<T> PageFetcher<T> for HttpPageFetcher
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_page(&self, request: PageRequest) -> Result<PageResult<T>> {
        let envelope = self.get_envelope(request.query_pairs()).await?;
        Ok(envelope.into_page_result(&self.items_field, &request)?)
    }
}

#[async_trait]
impl<T> CursorFetcher<T> for HttpPageFetcher
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch_slice(&self, request: CursorRequest) -> Result<CursorPage<T>> {
        let envelope = self.get_envelope(request.query_pairs()).await?;
        Ok(envelope.into_cursor_page(&self.items_field)?)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    // Without a trailing slash `Url::join` would drop the last path segment.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized).with_context(|| format!("invalid server url '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("server url '{raw}' must use http or https");
    }
    Ok(url)
}

fn join_path(base_url: &Url, path: &str) -> Result<Url> {
    base_url
        .join(path.trim_start_matches('/'))
        .with_context(|| format!("invalid resource path '{path}'"))
}

fn unauthorized() -> PageError {
    PageError::new(
        PageErrorKind::Unauthorized,
        "unauthorized: the session is no longer valid",
    )
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<PageEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_else(|| format!("server error ({status})"))
}

fn transport_error(err: reqwest::Error) -> anyhow::Error {
    let error = if err.is_timeout() {
        PageError::new(PageErrorKind::Timeout, format!("request timeout: {err}"))
    } else {
        PageError::new(PageErrorKind::Server, format!("network error: {err}"))
    };
    error.into()
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
