//! MCP Resources
//!
//! Recent data as CSV and FAQ answers, readable by URI.

pub mod data;
pub mod docs;

use super::registry::McpRegistry;

/// Register all resources with the registry
pub fn register_all_resources(registry: &mut McpRegistry) {
    data::register_resources(registry);
    docs::register_resources(registry);
}
