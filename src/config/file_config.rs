use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub dry_run: Option<bool>,
    /// Default `user:token` used when a request carries no credentials.
    pub token: Option<String>,

    // Upstream services
    pub upstream: Option<UpstreamConfig>,
    pub plugins: Option<PluginsConfig>,
    pub docs: Option<DocsConfig>,
    pub rate_limit: Option<RateLimitFileConfig>,
    pub image_proxy: Option<ImageProxyConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub data_api_url: Option<String>,
    pub manifest_api_url: Option<String>,
    pub scheduler_url: Option<String>,
    pub timeout_sec: Option<u64>,
    pub max_records: Option<usize>,
    pub max_csv_rows: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PluginsConfig {
    pub registry_url: Option<String>,
    pub cache_path: Option<String>,
    pub cache_ttl_hours: Option<u64>,
    /// Directory `create_plugin` writes scaffolds into.
    pub output_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DocsConfig {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RateLimitFileConfig {
    pub read_per_minute: Option<u32>,
    pub write_per_minute: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ImageProxyConfig {
    pub storage_hosts: Option<Vec<String>>,
    pub cache_ttl_sec: Option<u64>,
    pub cache_entries: Option<usize>,
    pub cache_max_bytes: Option<usize>,
    pub storage_username: Option<String>,
    pub storage_password: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 8100
bind_address = "0.0.0.0"
logging_level = "headers"
dry_run = true

[upstream]
data_api_url = "http://localhost:9000/api/v1/query"
timeout_sec = 5
max_csv_rows = 50

[plugins]
cache_ttl_hours = 2
output_dir = "/srv/plugins"

[rate_limit]
write_per_minute = 3

[image_proxy]
storage_hosts = ["storage.example.org"]
cache_entries = 8
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.port, Some(8100));
        assert_eq!(config.bind_address.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.dry_run, Some(true));

        let upstream = config.upstream.unwrap();
        assert_eq!(
            upstream.data_api_url.as_deref(),
            Some("http://localhost:9000/api/v1/query")
        );
        assert_eq!(upstream.timeout_sec, Some(5));
        assert_eq!(upstream.max_csv_rows, Some(50));
        assert!(upstream.scheduler_url.is_none());

        let plugins = config.plugins.unwrap();
        assert_eq!(plugins.cache_ttl_hours, Some(2));
        assert_eq!(plugins.output_dir.as_deref(), Some("/srv/plugins"));
        assert_eq!(config.rate_limit.unwrap().write_per_minute, Some(3));

        let proxy = config.image_proxy.unwrap();
        assert_eq!(
            proxy.storage_hosts,
            Some(vec!["storage.example.org".to_string()])
        );
        assert_eq!(proxy.cache_entries, Some(8));
    }

    #[test]
    fn test_load_empty_config() {
        let file = NamedTempFile::new().unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.port.is_none());
        assert!(config.upstream.is_none());
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number").unwrap();
        let result = FileConfig::load(file.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = FileConfig::load(Path::new("/nonexistent/sage-mcp.toml"));
        assert!(result.is_err());
    }
}
