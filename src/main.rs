use anyhow::Result;
use clap::Parser;
use std::{fmt::Debug, path::PathBuf};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sage_mcp_server::config::{self, AppConfig, FileConfig};
use sage_mcp_server::server::{metrics, run_server, RequestsLoggingLevel};
use sage_mcp_server::services::SageServices;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The address to bind to.
    #[clap(long, default_value = "127.0.0.1")]
    pub bind_address: String,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Validate job submissions against the scheduler without creating them.
    #[clap(long)]
    pub dry_run: bool,

    /// Default credentials (user:token) for callers that bring none.
    #[clap(long, env = "SAGE_USER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Base URL of the data API query endpoint.
    #[clap(long, default_value = config::DEFAULT_DATA_API_URL)]
    pub data_api_url: String,

    /// Base URL of the node manifest API.
    #[clap(long, default_value = config::DEFAULT_MANIFEST_API_URL)]
    pub manifest_api_url: String,

    /// Base URL of the edge scheduler.
    #[clap(long, env = "SES_HOST", default_value = config::DEFAULT_SCHEDULER_URL)]
    pub scheduler_url: String,

    /// Plugin registry (ECR) apps endpoint.
    #[clap(long, default_value = config::DEFAULT_PLUGIN_REGISTRY_URL)]
    pub plugin_registry_url: String,

    /// Timeout in seconds for upstream requests.
    #[clap(long, default_value_t = 60)]
    pub upstream_timeout_sec: u64,

    /// Maximum number of records kept from a single data query.
    #[clap(long, default_value_t = 100_000)]
    pub max_records: usize,

    /// Maximum number of rows in an exported CSV.
    #[clap(long, default_value_t = 1000)]
    pub max_csv_rows: usize,

    /// Markdown documentation searched by the docs tools.
    #[clap(long, value_parser = parse_path, default_value = "llms.md")]
    pub docs_path: PathBuf,

    /// Where the plugin registry listing is cached on disk.
    #[clap(long, value_parser = parse_path)]
    pub plugin_cache_path: Option<PathBuf>,

    /// Hours before the plugin cache is refreshed.
    #[clap(long, default_value_t = 24)]
    pub plugin_cache_ttl_hours: u64,

    /// Directory new plugin scaffolds are written to.
    #[clap(long, value_parser = parse_path)]
    pub plugin_output_dir: Option<PathBuf>,

    /// Read tool calls allowed per caller per minute.
    #[clap(long, default_value_t = 120)]
    pub read_per_minute: u32,

    /// Job tool calls allowed per caller per minute.
    #[clap(long, default_value_t = 30)]
    pub write_per_minute: u32,

    /// Hosts the image proxy may fetch from.
    #[clap(long, value_delimiter = ',', default_value = config::DEFAULT_STORAGE_HOST)]
    pub storage_hosts: Vec<String>,

    /// Seconds a proxied image stays cached.
    #[clap(long, default_value_t = 600)]
    pub image_cache_ttl_sec: u64,

    /// Number of proxied images kept in memory.
    #[clap(long, default_value_t = 256)]
    pub image_cache_entries: usize,

    /// Images larger than this many bytes are not cached.
    #[clap(long, default_value_t = 8 * 1024 * 1024)]
    pub image_cache_max_bytes: usize,

    /// Storage account used by the image proxy when the caller has none.
    #[clap(long, env = "SAGE_USER")]
    pub storage_username: Option<String>,

    #[clap(long, env = "SAGE_PASS", hide_env_values = true)]
    pub storage_password: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            port: args.port,
            bind_address: args.bind_address.clone(),
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            dry_run: args.dry_run,
            token: args.token.clone(),
            data_api_url: args.data_api_url.clone(),
            manifest_api_url: args.manifest_api_url.clone(),
            scheduler_url: args.scheduler_url.clone(),
            plugin_registry_url: args.plugin_registry_url.clone(),
            upstream_timeout_sec: args.upstream_timeout_sec,
            max_records: args.max_records,
            max_csv_rows: args.max_csv_rows,
            docs_path: args.docs_path.clone(),
            plugin_cache_path: args.plugin_cache_path.clone(),
            plugin_cache_ttl_hours: args.plugin_cache_ttl_hours,
            plugin_output_dir: args.plugin_output_dir.clone(),
            read_per_minute: args.read_per_minute,
            write_per_minute: args.write_per_minute,
            storage_hosts: args.storage_hosts.clone(),
            image_cache_ttl_sec: args.image_cache_ttl_sec,
            image_cache_entries: args.image_cache_entries,
            image_cache_max_bytes: args.image_cache_max_bytes,
            storage_username: args.storage_username.clone(),
            storage_password: args.storage_password.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&config::CliConfig::from(&cli_args), file_config)?;

    match &app_config.default_credentials {
        Some(credentials) => info!("Default credentials: {}", credentials),
        None => info!("No default credentials, anonymous callers get public tools only"),
    }
    if app_config.dry_run {
        info!("Dry run enabled: jobs are validated but never created");
    }

    info!("Initializing metrics...");
    metrics::init_metrics();

    let services = SageServices::from_config(&app_config)?;

    run_server(app_config, services).await
}
