//! HTTP client for the edge code repository (ECR) app listing.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::PluginMetadata;
use crate::upstream::{build_http_client, send_json, send_text, UpstreamError};

const SERVICE: &str = "ecr";
const SCIENCE_FETCH_CONCURRENCY: usize = 8;

#[async_trait]
pub trait PluginSource: Send + Sync {
    /// Every published plugin.
    async fn fetch_plugins(&self) -> Result<Vec<PluginMetadata>, UpstreamError>;
}

/// Reads the app listing, which is either a bare array or `{"data": [...]}`.
/// Entries that don't parse or have no id are skipped.
pub fn parse_app_listing(value: Value) -> Result<Vec<PluginMetadata>, UpstreamError> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(UpstreamError::Decode {
                    service: SERVICE,
                    message: "expected an array of apps or a `data` array".to_string(),
                })
            }
        },
        _ => {
            return Err(UpstreamError::Decode {
                service: SERVICE,
                message: "expected an array of apps".to_string(),
            })
        }
    };

    let total = entries.len();
    let plugins: Vec<PluginMetadata> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<PluginMetadata>(entry) {
            Ok(plugin) if !plugin.id.is_empty() => Some(plugin),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping unparseable app entry: {}", e);
                None
            }
        })
        .collect();
    if plugins.len() < total {
        warn!(
            "Skipped {} of {} app entries without a usable id",
            total - plugins.len(),
            total
        );
    }
    Ok(plugins)
}

pub struct HttpPluginClient {
    client: reqwest::Client,
    apps_url: String,
    meta_files_url: String,
}

impl HttpPluginClient {
    /// `apps_url` is the app listing endpoint; science descriptions are read
    /// from the sibling `meta-files` endpoint.
    pub fn new(apps_url: String, timeout_sec: u64) -> Result<Self> {
        let apps_url = apps_url.trim_end_matches('/').to_string();
        let meta_files_url = match apps_url.rsplit_once('/') {
            Some((base, _)) => format!("{}/meta-files", base),
            None => format!("{}/meta-files", apps_url),
        };
        Ok(Self {
            client: build_http_client(timeout_sec)?,
            apps_url,
            meta_files_url,
        })
    }

    async fn science_description(&self, path: &str) -> Option<String> {
        let url = format!("{}/{}", self.meta_files_url, path.trim_start_matches('/'));
        match send_text(SERVICE, self.client.get(&url)).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("No science description at {}: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl PluginSource for HttpPluginClient {
    async fn fetch_plugins(&self) -> Result<Vec<PluginMetadata>, UpstreamError> {
        info!("Fetching plugins from {}", self.apps_url);
        let listing: Value = send_json(SERVICE, self.client.get(&self.apps_url)).await?;
        let plugins = parse_app_listing(listing)?;

        let plugins: Vec<PluginMetadata> = stream::iter(plugins)
            .map(|mut plugin| async move {
                if !plugin.science_description.is_empty() {
                    if let Some(text) = self.science_description(&plugin.science_description).await
                    {
                        plugin.science_description_content = text;
                    }
                }
                plugin
            })
            .buffered(SCIENCE_FETCH_CONCURRENCY)
            .collect()
            .await;

        info!("Fetched {} plugins from ECR", plugins.len());
        Ok(plugins)
    }
}
