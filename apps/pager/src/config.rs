use std::{collections::BTreeMap, fs, io, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::DEFAULT_PAGE_SIZE;

pub const DEFAULT_CONFIG_PATH: &str = "pager.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    pub resource: String,
    pub items_field: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub token: Option<String>,
    pub sync_path: Option<String>,
    pub filters: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000/api".into(),
            resource: "shopify/products".into(),
            items_field: "products".into(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: 30,
            token: None,
            sync_path: None,
            filters: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    resource: Option<String>,
    items_field: Option<String>,
    page_size: Option<u32>,
    request_timeout_secs: Option<u64>,
    token: Option<String>,
    sync_path: Option<String>,
    #[serde(default)]
    filters: BTreeMap<String, String>,
}

/// Defaults, then the TOML file (if present), then `APP__*` variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;

    if let Some(v) = file_cfg.server_url {
        settings.server_url = v;
    }
    if let Some(v) = file_cfg.resource {
        settings.resource = v;
    }
    if let Some(v) = file_cfg.items_field {
        settings.items_field = v;
    }
    if let Some(v) = file_cfg.page_size {
        settings.page_size = v.max(1);
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if file_cfg.token.is_some() {
        settings.token = file_cfg.token;
    }
    if file_cfg.sync_path.is_some() {
        settings.sync_path = file_cfg.sync_path;
    }
    settings.filters.extend(file_cfg.filters);
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = var("APP__RESOURCE") {
        settings.resource = v;
    }
    if let Some(v) = var("APP__ITEMS_FIELD") {
        settings.items_field = v;
    }
    if let Some(v) = var("APP__PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_size = parsed.max(1);
        }
    }
    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = var("APP__TOKEN") {
        settings.token = Some(v);
    }
    if let Some(v) = var("APP__SYNC_PATH") {
        settings.sync_path = Some(v);
    }
}

/// Parses a `key=value` filter argument.
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("filter '{raw}' must look like key=value"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("filter '{raw}' has an empty key"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
