//! SAGE MCP Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod data;
pub mod docs;
pub mod jobs;
pub mod mcp;
pub mod plugins;
pub mod server;
pub mod services;
pub mod upstream;

// Re-export commonly used types for convenience
pub use auth::SageCredentials;
pub use config::{AppConfig, CliConfig, FileConfig};
pub use server::{run_server, RequestsLoggingLevel};
pub use services::SageServices;
