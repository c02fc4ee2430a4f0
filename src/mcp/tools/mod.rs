//! MCP Tools
//!
//! Tool implementations for sensor data, nodes, jobs, plugins and docs.

pub mod data;
pub mod docs;
pub mod jobs;
pub mod nodes;
pub mod plugins;

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

use super::protocol::{McpError, ToolsCallResult};
use super::registry::{McpRegistry, ToolResult};
use crate::data::{NodeIdError, TimeRangeError, TimeWindow};
use crate::upstream::{describe, UpstreamError};

/// Register all tools with the registry
pub fn register_all_tools(registry: &mut McpRegistry) {
    data::register_tools(registry);
    nodes::register_tools(registry);
    jobs::register_tools(registry);
    plugins::register_tools(registry);
    docs::register_tools(registry);
    register_aliases(registry);
}

/// Earlier tool names some clients still call.
const ALIASES: &[(&str, &str, &str)] = &[
    (
        "mcp_sage_recommend_plugins",
        "find_plugins_for_task",
        "Recommend plugins for a natural language task description",
    ),
    (
        "mcp_sage_query_plugin_data_nl",
        "query_plugin_data_nl",
        "Query plugin data using natural language",
    ),
    (
        "mcp_sage_search_measurements",
        "search_measurements",
        "Search for specific measurement types using a pattern (regex supported)",
    ),
    (
        "mcp_sage_query_job_data",
        "query_job_data",
        "Query data generated by a running job",
    ),
    (
        "mcp_sage_get_cloud_images",
        "get_cloud_images",
        "Get recent cloud images and cloud related data from nodes",
    ),
];

fn register_aliases(registry: &mut McpRegistry) {
    for (alias, target, description) in ALIASES {
        registry.register_alias(alias, target, description);
    }
}

/// A failure the model gets to read: returned as an `isError` result rather
/// than a JSON-RPC error.
#[derive(Debug)]
pub struct ToolFailure(pub String);

impl ToolFailure {
    pub fn upstream(context: &str, error: &UpstreamError) -> Self {
        Self(describe(context, error))
    }
}

impl From<TimeRangeError> for ToolFailure {
    fn from(e: TimeRangeError) -> Self {
        Self(format!("Invalid time range: {}", e))
    }
}

impl From<NodeIdError> for ToolFailure {
    fn from(e: NodeIdError) -> Self {
        Self(format!("Invalid node: {}", e))
    }
}

pub type ToolOutcome = Result<String, ToolFailure>;

/// Turns a tool outcome into the MCP result.
pub fn finish(outcome: ToolOutcome) -> ToolResult {
    Ok(match outcome {
        Ok(text) => ToolsCallResult::text(text),
        Err(ToolFailure(message)) => ToolsCallResult::error(message),
    })
}

/// Deserializes tool arguments; `null` counts as an empty object.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, McpError> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))
}

/// Accepts ids sent either as JSON strings or as plain numbers.
pub fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
        Id::Uint(n) => n.to_string(),
    })
}

pub fn window(raw: &str) -> Result<TimeWindow, ToolFailure> {
    Ok(TimeWindow::parse(raw)?)
}

/// Value rendering for sample rows: numbers with two decimals.
pub fn sample_value(value: &crate::data::RecordValue) -> String {
    match value.as_f64() {
        Some(n) => format!("{:.2}", n),
        None => value.to_string(),
    }
}

pub(crate) fn default_time_range_30m() -> String {
    "-30m".to_string()
}

pub(crate) fn default_time_range_1h() -> String {
    "-1h".to_string()
}
