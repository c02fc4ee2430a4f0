mod file_config;

pub use file_config::{
    DocsConfig, FileConfig, ImageProxyConfig, PluginsConfig, RateLimitFileConfig, UpstreamConfig,
};

use crate::auth::SageCredentials;
use crate::mcp::rate_limit::RateLimitConfig;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::net::IpAddr;
use std::path::PathBuf;

pub const DEFAULT_DATA_API_URL: &str = "https://data.sagecontinuum.org/api/v1/query";
pub const DEFAULT_MANIFEST_API_URL: &str = "https://auth.sagecontinuum.org";
pub const DEFAULT_SCHEDULER_URL: &str = "https://es.sagecontinuum.org";
pub const DEFAULT_PLUGIN_REGISTRY_URL: &str = "https://ecr.sagecontinuum.org/api/apps";
pub const DEFAULT_STORAGE_HOST: &str = "storage.sagecontinuum.org";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub bind_address: String,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub dry_run: bool,
    pub token: Option<String>,
    pub data_api_url: String,
    pub manifest_api_url: String,
    pub scheduler_url: String,
    pub plugin_registry_url: String,
    pub upstream_timeout_sec: u64,
    pub max_records: usize,
    pub max_csv_rows: usize,
    pub docs_path: PathBuf,
    pub plugin_cache_path: Option<PathBuf>,
    pub plugin_cache_ttl_hours: u64,
    pub plugin_output_dir: Option<PathBuf>,
    pub read_per_minute: u32,
    pub write_per_minute: u32,
    pub storage_hosts: Vec<String>,
    pub image_cache_ttl_sec: u64,
    pub image_cache_entries: usize,
    pub image_cache_max_bytes: usize,
    pub storage_username: Option<String>,
    pub storage_password: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        let rate_limit = RateLimitConfig::default();
        Self {
            port: 8000,
            bind_address: "127.0.0.1".to_string(),
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::default(),
            dry_run: false,
            token: None,
            data_api_url: DEFAULT_DATA_API_URL.to_string(),
            manifest_api_url: DEFAULT_MANIFEST_API_URL.to_string(),
            scheduler_url: DEFAULT_SCHEDULER_URL.to_string(),
            plugin_registry_url: DEFAULT_PLUGIN_REGISTRY_URL.to_string(),
            upstream_timeout_sec: 60,
            max_records: 100_000,
            max_csv_rows: 1000,
            docs_path: PathBuf::from("llms.md"),
            plugin_cache_path: None,
            plugin_cache_ttl_hours: 24,
            plugin_output_dir: None,
            read_per_minute: rate_limit.read_per_minute,
            write_per_minute: rate_limit.write_per_minute,
            storage_hosts: vec![DEFAULT_STORAGE_HOST.to_string()],
            image_cache_ttl_sec: 600,
            image_cache_entries: 256,
            image_cache_max_bytes: 8 * 1024 * 1024,
            storage_username: None,
            storage_password: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub bind_address: IpAddr,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub dry_run: bool,
    pub default_credentials: Option<SageCredentials>,

    // Feature configs (with defaults)
    pub upstream: UpstreamSettings,
    pub plugins: PluginSettings,
    pub docs_path: PathBuf,
    pub rate_limit: RateLimitConfig,
    pub image_proxy: ImageProxySettings,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub data_api_url: String,
    pub manifest_api_url: String,
    pub scheduler_url: String,
    pub timeout_sec: u64,
    pub max_records: usize,
    pub max_csv_rows: usize,
}

#[derive(Debug, Clone)]
pub struct PluginSettings {
    pub registry_url: String,
    pub cache_path: PathBuf,
    pub cache_ttl_hours: u64,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ImageProxySettings {
    pub storage_hosts: Vec<String>,
    pub cache_ttl_sec: u64,
    pub cache_entries: usize,
    pub cache_max_bytes: usize,
    pub storage_credentials: Option<SageCredentials>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let bind_address_str = file
            .bind_address
            .unwrap_or_else(|| cli.bind_address.clone());
        let bind_address: IpAddr = bind_address_str
            .parse()
            .with_context(|| format!("Invalid bind_address: {}", bind_address_str))?;

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let dry_run = file.dry_run.unwrap_or(cli.dry_run);

        let default_credentials = match file.token.or_else(|| cli.token.clone()) {
            Some(raw) if !raw.trim().is_empty() => Some(
                SageCredentials::parse(&raw).context("Invalid default token, expected user:token")?,
            ),
            _ => None,
        };

        let upstream_file = file.upstream.unwrap_or_default();
        let upstream = UpstreamSettings {
            data_api_url: upstream_file
                .data_api_url
                .unwrap_or_else(|| cli.data_api_url.clone()),
            manifest_api_url: upstream_file
                .manifest_api_url
                .unwrap_or_else(|| cli.manifest_api_url.clone()),
            scheduler_url: upstream_file
                .scheduler_url
                .unwrap_or_else(|| cli.scheduler_url.clone()),
            timeout_sec: upstream_file.timeout_sec.unwrap_or(cli.upstream_timeout_sec),
            max_records: upstream_file.max_records.unwrap_or(cli.max_records),
            max_csv_rows: upstream_file.max_csv_rows.unwrap_or(cli.max_csv_rows),
        };
        for (name, url) in [
            ("data_api_url", &upstream.data_api_url),
            ("manifest_api_url", &upstream.manifest_api_url),
            ("scheduler_url", &upstream.scheduler_url),
        ] {
            validate_url(name, url)?;
        }
        if upstream.timeout_sec == 0 {
            bail!("upstream timeout_sec must be greater than 0");
        }
        if upstream.max_records == 0 || upstream.max_csv_rows == 0 {
            bail!("max_records and max_csv_rows must be greater than 0");
        }

        let plugins_file = file.plugins.unwrap_or_default();
        let plugins = PluginSettings {
            registry_url: plugins_file
                .registry_url
                .unwrap_or_else(|| cli.plugin_registry_url.clone()),
            cache_path: plugins_file
                .cache_path
                .map(PathBuf::from)
                .or_else(|| cli.plugin_cache_path.clone())
                .unwrap_or_else(default_plugin_cache_path),
            cache_ttl_hours: plugins_file
                .cache_ttl_hours
                .unwrap_or(cli.plugin_cache_ttl_hours),
            output_dir: plugins_file
                .output_dir
                .map(PathBuf::from)
                .or_else(|| cli.plugin_output_dir.clone())
                .unwrap_or_else(default_plugin_output_dir),
        };
        validate_url("plugin_registry_url", &plugins.registry_url)?;

        let docs_path = file
            .docs
            .and_then(|d| d.path)
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.docs_path.clone());

        let rate_file = file.rate_limit.unwrap_or_default();
        let rate_limit = RateLimitConfig {
            read_per_minute: rate_file.read_per_minute.unwrap_or(cli.read_per_minute),
            write_per_minute: rate_file.write_per_minute.unwrap_or(cli.write_per_minute),
        };
        if rate_limit.read_per_minute == 0 || rate_limit.write_per_minute == 0 {
            bail!("Rate limits must be greater than 0");
        }

        let proxy_file = file.image_proxy.unwrap_or_default();
        let storage_username = proxy_file
            .storage_username
            .or_else(|| cli.storage_username.clone());
        let storage_password = proxy_file
            .storage_password
            .or_else(|| cli.storage_password.clone());
        let storage_credentials = match (storage_username, storage_password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(SageCredentials::new(user, pass).context("Invalid storage credentials")?)
            }
            (Some(_), None) | (None, Some(_)) => {
                bail!("Both storage username and password must be provided together")
            }
            _ => None,
        };
        let image_proxy = ImageProxySettings {
            storage_hosts: proxy_file
                .storage_hosts
                .unwrap_or_else(|| cli.storage_hosts.clone()),
            cache_ttl_sec: proxy_file.cache_ttl_sec.unwrap_or(cli.image_cache_ttl_sec),
            cache_entries: proxy_file.cache_entries.unwrap_or(cli.image_cache_entries),
            cache_max_bytes: proxy_file
                .cache_max_bytes
                .unwrap_or(cli.image_cache_max_bytes),
            storage_credentials,
        };

        Ok(Self {
            port,
            bind_address,
            metrics_port,
            logging_level,
            dry_run,
            default_credentials,
            upstream,
            plugins,
            docs_path,
            rate_limit,
            image_proxy,
        })
    }
}

fn validate_url(name: &str, url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{} must be an http(s) URL, got {:?}", name, url);
    }
    Ok(())
}

fn default_plugin_cache_path() -> PathBuf {
    std::env::temp_dir().join("sage_plugin_cache.json")
}

pub fn default_plugin_output_dir() -> PathBuf {
    PathBuf::from("generated_plugins")
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("headers"),
            Some(RequestsLoggingLevel::Headers)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("BODY"),
            Some(RequestsLoggingLevel::Body)
        ));
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            port: 8100,
            token: Some("alice:tok".to_string()),
            dry_run: true,
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.port, 8100);
        assert_eq!(config.bind_address.to_string(), "127.0.0.1");
        assert_eq!(config.metrics_port, 9091);
        assert!(config.dry_run);
        assert_eq!(
            config.default_credentials.as_ref().map(|c| c.username()),
            Some("alice")
        );
        assert_eq!(config.upstream.data_api_url, DEFAULT_DATA_API_URL);
        assert_eq!(config.upstream.timeout_sec, 60);
        assert_eq!(config.plugins.cache_ttl_hours, 24);
        assert_eq!(config.plugins.output_dir, PathBuf::from("generated_plugins"));
        assert_eq!(config.rate_limit, RateLimitConfig::default());
        assert_eq!(
            config.image_proxy.storage_hosts,
            vec![DEFAULT_STORAGE_HOST.to_string()]
        );
        assert!(config.image_proxy.storage_credentials.is_none());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            port: 8000,
            logging_level: RequestsLoggingLevel::Path,
            ..Default::default()
        };

        let file_config = FileConfig {
            port: Some(9000),
            logging_level: Some("body".to_string()),
            upstream: Some(UpstreamConfig {
                scheduler_url: Some("http://localhost:7000".to_string()),
                max_csv_rows: Some(10),
                ..Default::default()
            }),
            rate_limit: Some(RateLimitFileConfig {
                write_per_minute: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.port, 9000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.upstream.scheduler_url, "http://localhost:7000");
        assert_eq!(config.upstream.max_csv_rows, 10);
        assert_eq!(config.rate_limit.write_per_minute, 2);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.upstream.data_api_url, DEFAULT_DATA_API_URL);
        assert_eq!(config.rate_limit.read_per_minute, 120);
    }

    #[test]
    fn test_resolve_invalid_default_token() {
        let cli = CliConfig {
            token: Some(":missing-user".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid default token"));
    }

    #[test]
    fn test_resolve_blank_token_means_anonymous() {
        let cli = CliConfig {
            token: Some("   ".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(config.default_credentials.is_none());
    }

    #[test]
    fn test_resolve_rejects_non_http_url() {
        let cli = CliConfig {
            data_api_url: "ftp://example.org".to_string(),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("data_api_url"));
    }

    #[test]
    fn test_resolve_rejects_bad_bind_address() {
        let cli = CliConfig {
            bind_address: "not-an-ip".to_string(),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_resolve_storage_credentials_pairing() {
        let cli = CliConfig {
            storage_username: Some("svc".to_string()),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());

        let cli = CliConfig {
            storage_username: Some("svc".to_string()),
            storage_password: Some("pw".to_string()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        let creds = config.image_proxy.storage_credentials.unwrap();
        assert_eq!(creds.basic_auth(), Some(("svc", "pw")));
    }

    #[test]
    fn test_resolve_zero_rate_limit_error() {
        let cli = CliConfig {
            read_per_minute: 0,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }
}
