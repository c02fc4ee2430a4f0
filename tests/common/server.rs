//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server wired to its own mock upstream.

use super::constants::*;
use super::mock_upstream::{MockUpstream, UpstreamLog};
use sage_mcp_server::config::{AppConfig, CliConfig};
use sage_mcp_server::server::{metrics, server::make_app, RequestsLoggingLevel};
use sage_mcp_server::services::SageServices;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

const DOCS_MARKDOWN: &str = "# Getting Started\n\
Create an account at the portal and request access to nodes.\n\n\
# Data API\n\
Query sensor data with POST requests to the query endpoint using sage_data_client.\n\n\
## Pluginctl\n\
Use pluginctl to deploy and test plugins on a node before scheduling them.\n";

/// Knobs for a test server.
pub struct TestServerOptions {
    /// Credentials used when a request carries none
    pub default_token: Option<String>,
    pub dry_run: bool,
    pub write_per_minute: u32,
    /// Storage account for the image proxy
    pub storage_account: Option<(String, String)>,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            default_token: None,
            dry_run: false,
            write_per_minute: 30,
            storage_account: None,
        }
    }
}

/// Test server instance with an isolated mock upstream
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// The platform services the server talks to
    pub upstream: MockUpstream,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with default options
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// This function:
    /// 1. Starts the mock upstream
    /// 2. Writes the docs corpus to a temp dir
    /// 3. Binds to a random port (127.0.0.1:0)
    /// 4. Spawns the server in a background task
    /// 5. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if the config is rejected, port binding fails or the server
    /// doesn't become ready within timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        metrics::init_metrics();

        let upstream = MockUpstream::spawn().await;
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let docs_path = temp_dir.path().join("llms.md");
        std::fs::write(&docs_path, DOCS_MARKDOWN).expect("Failed to write docs");

        let (storage_username, storage_password) = match options.storage_account {
            Some((user, pass)) => (Some(user), Some(pass)),
            None => (None, None),
        };
        let cli = CliConfig {
            port: 0,
            metrics_port: 0,
            logging_level: RequestsLoggingLevel::None,
            dry_run: options.dry_run,
            token: options.default_token,
            data_api_url: format!("{}/api/v1/query", upstream.base_url),
            manifest_api_url: upstream.base_url.clone(),
            scheduler_url: upstream.base_url.clone(),
            plugin_registry_url: format!("{}/api/apps", upstream.base_url),
            upstream_timeout_sec: 5,
            docs_path,
            plugin_cache_path: Some(temp_dir.path().join("plugins.json")),
            plugin_output_dir: Some(temp_dir.path().join("generated")),
            write_per_minute: options.write_per_minute,
            storage_hosts: vec!["127.0.0.1".to_string()],
            storage_username,
            storage_password,
            ..CliConfig::default()
        };
        let config = AppConfig::resolve(&cli, None).expect("Invalid test config");
        let services = SageServices::from_config(&config).expect("Failed to build services");

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = make_app(config, services)
            .await
            .expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            upstream,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// What the mock upstream has seen so far
    pub fn upstream_log(&self) -> Arc<UpstreamLog> {
        self.upstream.log.clone()
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    // Server is ready
                    return;
                }
                _ => {
                    // Server not ready yet, wait and retry
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
