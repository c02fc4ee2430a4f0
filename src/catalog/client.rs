//! HTTP client for node and sensor manifests.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::models::{NodeDetail, NodeManifest, SensorHardware};
use crate::upstream::{build_http_client, send_json, UpstreamError};

const SERVICE: &str = "manifests";

#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeManifest>, UpstreamError>;

    async fn node_detail(&self, vsn: &str) -> Result<NodeDetail, UpstreamError>;

    async fn sensors(&self) -> Result<Vec<SensorHardware>, UpstreamError>;
}

pub struct HttpManifestClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpManifestClient {
    pub fn new(base_url: String, timeout_sec: u64) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout_sec)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ManifestSource for HttpManifestClient {
    async fn list_nodes(&self) -> Result<Vec<NodeManifest>, UpstreamError> {
        let url = self.url("/manifests/");
        debug!("Fetching node manifests from {}", url);
        send_json(SERVICE, self.client.get(url)).await
    }

    async fn node_detail(&self, vsn: &str) -> Result<NodeDetail, UpstreamError> {
        let url = self.url(&format!(
            "/api/v-beta/nodes/{}/",
            urlencoding::encode(vsn)
        ));
        debug!("Fetching node detail from {}", url);
        send_json(SERVICE, self.client.get(url)).await
    }

    async fn sensors(&self) -> Result<Vec<SensorHardware>, UpstreamError> {
        let url = self.url("/sensors/");
        debug!("Fetching sensor hardware from {}", url);
        send_json(SERVICE, self.client.get(url)).await
    }
}
