use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use client_core::{
    ControllerOptions, HttpPageFetcher, PageFetchController, PageSnapshot, SessionContext,
};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, parse_filter, DEFAULT_CONFIG_PATH};

/// Walks a paginated admin list endpoint and prints each page as JSON.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    /// Resource path relative to the server url, e.g. `shopify/products`.
    #[arg(long)]
    resource: Option<String>,
    /// Envelope field holding the item array, e.g. `products`.
    #[arg(long)]
    items_field: Option<String>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    page_size: Option<u32>,
    #[arg(long, default_value = "")]
    search: String,
    /// Number of pages to walk forward from `--page`.
    #[arg(long, default_value_t = 1)]
    pages: u32,
    #[arg(long)]
    token: Option<String>,
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    /// Import endpoint to call once before the first page is fetched.
    #[arg(long)]
    sync_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config)?;
    if let Some(v) = args.server_url {
        settings.server_url = v;
    }
    if let Some(v) = args.resource {
        settings.resource = v;
    }
    if let Some(v) = args.items_field {
        settings.items_field = v;
    }
    if let Some(v) = args.page_size {
        settings.page_size = v.max(1);
    }
    if args.token.is_some() {
        settings.token = args.token;
    }
    if args.sync_path.is_some() {
        settings.sync_path = args.sync_path;
    }
    settings.filters.extend(args.filters);

    let session = SessionContext::new();
    session.initialize(settings.token.clone()).await;

    let fetcher = Arc::new(HttpPageFetcher::new(
        &settings.server_url,
        &settings.resource,
        settings.items_field.clone(),
        settings.request_timeout(),
        session.clone(),
    )?);
    info!(endpoint = %fetcher.endpoint(), "pager: starting");

    let mut options = ControllerOptions::new([settings.resource.clone()])
        .with_page_size(settings.page_size)
        .with_initial_page(args.page.max(1))
        .with_initial_search(args.search)
        .with_enabled(settings.sync_path.is_none());
    for (key, value) in &settings.filters {
        options = options.with_filter(key.clone(), value.clone());
    }
    let controller = PageFetchController::<Value>::new(fetcher.clone(), options);

    match &settings.sync_path {
        Some(sync_path) => {
            if !session.is_sync_complete(&settings.resource).await {
                fetcher.trigger_sync(sync_path).await?;
                session.mark_sync_complete(&settings.resource).await;
            }
            controller.set_enabled(true).await;
        }
        None => controller.load().await,
    }

    let mut printed = 0;
    loop {
        let snapshot = controller.snapshot().await;
        ensure_loaded(&snapshot)?;
        println!("{}", serde_json::to_string(&render_page(&snapshot))?);
        printed += 1;

        if printed >= args.pages.max(1) || !snapshot.has_next_page {
            break;
        }
        controller.next_page().await;
    }

    Ok(())
}

/// Turns a failed fetch into the user-facing notice.
fn ensure_loaded(snapshot: &PageSnapshot<Value>) -> Result<()> {
    if let Some(error) = &snapshot.error {
        let notice = error.notice();
        bail!("{}: {}", notice.title, notice.message);
    }
    Ok(())
}

fn render_page(snapshot: &PageSnapshot<Value>) -> Value {
    json!({
        "page": snapshot.current_page,
        "pageSize": snapshot.page_size,
        "total": snapshot.total,
        "totalPages": snapshot.total_pages,
        "hasMore": snapshot.has_next_page,
        "hasPrevious": snapshot.has_previous_page,
        "search": snapshot.search_query,
        "updatedAt": snapshot.updated_at,
        "items": snapshot.items,
    })
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
