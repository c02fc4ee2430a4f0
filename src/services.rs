//! Handles to the platform services every tool call can reach.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{HttpManifestClient, ManifestSource};
use crate::config::AppConfig;
use crate::data::{DataSource, HttpDataClient};
use crate::docs::DocsCorpus;
use crate::jobs::{HttpJobClient, JobScheduler};
use crate::plugins::{HttpPluginClient, PluginCache, PluginRegistry};

#[derive(Clone)]
pub struct SageServices {
    pub data: Arc<dyn DataSource>,
    pub scheduler: Arc<dyn JobScheduler>,
    pub manifests: Arc<dyn ManifestSource>,
    pub plugins: Arc<PluginRegistry>,
    pub docs: Arc<DocsCorpus>,
}

impl SageServices {
    /// Builds the HTTP backed services described by the configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let upstream = &config.upstream;
        let data = HttpDataClient::new(
            upstream.data_api_url.clone(),
            upstream.timeout_sec,
            upstream.max_records,
        )?;
        let scheduler = HttpJobClient::new(upstream.scheduler_url.clone(), upstream.timeout_sec)?;
        let manifests =
            HttpManifestClient::new(upstream.manifest_api_url.clone(), upstream.timeout_sec)?;
        let plugin_source =
            HttpPluginClient::new(config.plugins.registry_url.clone(), upstream.timeout_sec)?;
        let plugins = PluginRegistry::new(
            Arc::new(plugin_source),
            PluginCache::new(
                config.plugins.cache_path.clone(),
                config.plugins.cache_ttl_hours,
            ),
        );
        let docs = DocsCorpus::load(&config.docs_path);

        info!(
            "Upstreams: data={} scheduler={} manifests={} ecr={}",
            upstream.data_api_url,
            upstream.scheduler_url,
            upstream.manifest_api_url,
            config.plugins.registry_url
        );

        Ok(Self {
            data: Arc::new(data),
            scheduler: Arc::new(scheduler),
            manifests: Arc::new(manifests),
            plugins: Arc::new(plugins),
            docs: Arc::new(docs),
        })
    }
}
