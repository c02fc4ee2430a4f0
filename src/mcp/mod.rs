//! MCP (Model Context Protocol) Server
//!
//! Exposes SAGE data, node metadata, plugins, jobs and documentation to
//! LLM clients.
//!
//! ## Architecture
//!
//! - Transport: streamable HTTP at `/mcp` (JSON responses, batches allowed)
//! - Auth: SAGE credentials per request (`Authorization`, `X-Sage-Token` or
//!   `?token=`), falling back to the server's default token
//! - Tools: read tools are public, job tools need credentials
//! - Resources: recent data as CSV and FAQ answers
//! - Prompts: canned starters for common tasks

pub mod context;
pub mod handler;
pub mod prompts;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod resources;
pub mod tools;

pub use handler::{create_mcp_state, mcp_delete_handler, mcp_post_handler, McpState};
pub use protocol::{McpError, McpRequest, McpResponse};
pub use registry::McpRegistry;
