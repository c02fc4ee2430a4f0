use axum::extract::FromRef;

use crate::auth::SageCredentials;
use crate::config::AppConfig;
use crate::mcp::context::{ToolContext, ToolSettings};
use crate::mcp::McpState;
use crate::services::SageServices;
use std::sync::Arc;
use std::time::Instant;

use super::image_proxy::ImageProxy;

pub type GuardedConfig = Arc<AppConfig>;
pub type GuardedMcpState = Arc<McpState>;
pub type GuardedImageProxy = Arc<ImageProxy>;

#[derive(Clone)]
pub struct ServerState {
    pub config: GuardedConfig,
    pub start_time: Instant,
    pub services: SageServices,
    pub mcp_state: GuardedMcpState,
    pub image_proxy: GuardedImageProxy,
    pub hash: String,
}

impl ServerState {
    pub fn version(&self) -> String {
        format!("{}-{}", env!("CARGO_PKG_VERSION"), self.hash)
    }

    /// Context for one MCP call made with `credentials`.
    pub fn tool_context(&self, credentials: Option<SageCredentials>) -> ToolContext {
        ToolContext {
            credentials,
            services: self.services.clone(),
            settings: ToolSettings {
                dry_run: self.config.dry_run,
                max_csv_rows: self.config.upstream.max_csv_rows,
                plugin_output_dir: self.config.plugins.output_dir.clone(),
            },
            server_version: self.version(),
            start_time: self.start_time,
        }
    }
}

impl FromRef<ServerState> for GuardedConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedMcpState {
    fn from_ref(input: &ServerState) -> Self {
        input.mcp_state.clone()
    }
}

impl FromRef<ServerState> for GuardedImageProxy {
    fn from_ref(input: &ServerState) -> Self {
        input.image_proxy.clone()
    }
}
