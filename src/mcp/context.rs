//! MCP Tool Execution Context
//!
//! Everything a tool or resource handler may touch during one call. The
//! caller's credentials live here and nowhere else, so concurrent calls
//! never see each other's token.

use std::path::PathBuf;
use std::time::Instant;

use super::protocol::McpError;
use crate::auth::SageCredentials;
use crate::services::SageServices;

/// Per-server knobs the tools read.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Submit jobs as validation-only dry runs.
    pub dry_run: bool,
    pub max_csv_rows: usize,
    /// Where `create_plugin` writes new plugin scaffolds.
    pub plugin_output_dir: PathBuf,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_csv_rows: 1000,
            plugin_output_dir: crate::config::default_plugin_output_dir(),
        }
    }
}

/// Context provided to tool and resource handlers during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Credentials of the calling client, if it sent any
    pub credentials: Option<SageCredentials>,

    /// Platform service clients
    pub services: SageServices,

    pub settings: ToolSettings,

    /// Server version info
    pub server_version: String,

    /// Server start time (for uptime calculation)
    pub start_time: Instant,
}

impl ToolContext {
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Credentials for calls that cannot run anonymously.
    pub fn require_credentials(&self) -> Result<&SageCredentials, McpError> {
        self.credentials.as_ref().ok_or(McpError::Unauthorized)
    }

    /// Key used for rate limiting and logs.
    pub fn caller(&self) -> String {
        self.credentials
            .as_ref()
            .map(SageCredentials::identity)
            .unwrap_or_else(|| "anonymous".to_string())
    }
}
