//! Plugin Tools
//!
//! Plugin discovery from the edge code repository and data lookups by plugin.

use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write;
use tracing::info;

use super::{default_time_range_1h, finish, parse_args, window, ToolFailure, ToolOutcome};
use crate::data::record::{coerced_stats, time_bounds, unique};
use crate::data::time_range::format_display;
use crate::data::{parse_node_list, QueryFilter, Record, TimeWindow};
use crate::mcp::context::ToolContext;
use crate::mcp::registry::{
    Access, McpRegistry, RegisteredTool, ToolBuilder, ToolCategory, ToolResult,
};
use crate::plugins::{
    nl_query, PluginError, PluginGenerator, PluginMetadata, PluginRequirements, PluginTemplate,
};

const MAX_RECOMMENDATIONS: usize = 10;
/// Plugins queried for one natural-language request.
const MAX_NL_PLUGINS: usize = 3;
const SCIENCE_SNIPPET_LENGTH: usize = 200;

/// Register plugin tools with the registry
pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(find_plugins_for_task_tool());
    registry.register_tool(get_plugin_data_tool());
    registry.register_tool(query_plugin_data_nl_tool());
    registry.register_tool(create_plugin_tool());
}

impl From<PluginError> for ToolFailure {
    fn from(e: PluginError) -> Self {
        ToolFailure(format!("Error reading the plugin registry: {}", e))
    }
}

fn write_plugin(out: &mut String, index: usize, plugin: &PluginMetadata) {
    let _ = writeln!(out, "\n{}. {} (v{}):", index, plugin.name, plugin.version);
    let _ = writeln!(out, "   Image: {}", plugin.id);
    if !plugin.description.is_empty() {
        let _ = writeln!(out, "   Description: {}", plugin.description);
    }
    if !plugin.keywords.is_empty() {
        let _ = writeln!(out, "   Keywords: {}", plugin.keywords);
    }
    if !plugin.authors.is_empty() {
        let _ = writeln!(out, "   Authors: {}", plugin.authors);
    }
    if !plugin.inputs.is_empty() {
        let inputs: Vec<String> = plugin
            .inputs
            .iter()
            .map(|i| format!("{} ({})", i.id, i.input_type))
            .collect();
        let _ = writeln!(out, "   Parameters: {}", inputs.join(", "));
    }
    if !plugin.homepage.is_empty() {
        let _ = writeln!(out, "   Homepage: {}", plugin.homepage);
    }
    let science = plugin.science_description_content.trim();
    if !science.is_empty() {
        let mut snippet: String = science.chars().take(SCIENCE_SNIPPET_LENGTH).collect();
        if science.chars().count() > SCIENCE_SNIPPET_LENGTH {
            snippet.push_str("...");
        }
        let _ = writeln!(out, "   Science Description: {}", snippet.trim());
    }
}

/// Ranked plugin suggestions for a task, as shown to the model.
pub(super) async fn plugin_recommendations(ctx: &ToolContext, task: &str) -> ToolOutcome {
    let task = task.trim();
    if task.is_empty() {
        return Ok("Please provide a task description to find relevant plugins.".to_string());
    }
    info!("Searching for plugins matching task: {}", task);

    let plugins = ctx.services.plugins.search(task, MAX_RECOMMENDATIONS).await?;
    if plugins.is_empty() {
        return Ok(format!(
            "No plugins found matching '{}'.\n\n\
             Try using different keywords or check these categories:\n\
             - Camera/Vision: camera, image, video, ptz, detection\n\
             - Audio: sound, audio, microphone, bird, noise\n\
             - Environmental: temperature, humidity, pressure, weather\n\
             - AI/Detection: yolo, object detection, recognition\n\
             - Movement: motion, tracking, pan, tilt, zoom",
            task
        ));
    }

    let mut out = format!(
        "Found {} plugins matching your task '{}':\n",
        plugins.len(),
        task
    );
    for (i, plugin) in plugins.iter().enumerate() {
        write_plugin(&mut out, i + 1, plugin);
    }
    Ok(out)
}

/// Summary of one plugin's records.
fn format_plugin_data(name: &str, plugin: Option<&PluginMetadata>, records: &[Record]) -> String {
    if records.is_empty() {
        return format!("No data found for plugin {}", name);
    }
    let mut out = format!("📊 Data from {}:\n", name);
    let _ = writeln!(out, "Total records: {}", records.len());
    if let Some((first, last)) = time_bounds(records) {
        let _ = writeln!(
            out,
            "Time range: {} to {}",
            format_display(&first),
            format_display(&last)
        );
    }
    let nodes = unique(records, "vsn");
    if !nodes.is_empty() {
        let _ = writeln!(out, "Nodes: {}", nodes.join(", "));
    }
    let measurements = unique(records, "name");
    let _ = writeln!(out, "Measurements: {}", measurements.join(", "));

    match coerced_stats(records) {
        Some(stats) => {
            out.push_str("\nValue Statistics:\n");
            let _ = writeln!(out, "  Minimum: {:.2}", stats.min);
            let _ = writeln!(out, "  Maximum: {:.2}", stats.max);
            let _ = writeln!(out, "  Average: {:.2}", stats.mean);
        }
        None => {
            let _ = writeln!(out, "\nValues are not numeric ({} records)", records.len());
        }
    }

    if let Some(plugin) = plugin {
        if !plugin.description.is_empty() {
            let _ = writeln!(out, "\nPlugin Description: {}", plugin.description);
        }
    }
    out.trim_end().to_string()
}

async fn query_pattern(
    ctx: &ToolContext,
    window: &TimeWindow,
    pattern: &str,
    nodes: &[String],
) -> Result<Vec<Record>, ToolFailure> {
    let filter = QueryFilter::new().plugin(pattern).nodes(nodes);
    ctx.services
        .data
        .query(ctx.credentials.as_ref(), window, &filter)
        .await
        .map_err(|e| ToolFailure::upstream("Error getting plugin data", &e))
}

// ============================================================================
// find_plugins_for_task
// ============================================================================

#[derive(Debug, Deserialize)]
struct FindPluginsParams {
    #[serde(default)]
    task_description: String,
}

fn find_plugins_for_task_tool() -> RegisteredTool {
    ToolBuilder::new("find_plugins_for_task")
        .description("Find and recommend plugins suitable for a task description, matched against plugin names, descriptions, keywords and science descriptions in the edge code repository")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "task_description": {"type": "string", "description": "e.g. 'count cars with a camera'"}
            },
            "required": ["task_description"]
        }))
        .category(ToolCategory::Read)
        .build(find_plugins_for_task_handler)
}

async fn find_plugins_for_task_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: FindPluginsParams = parse_args(args)?;
    finish(plugin_recommendations(&ctx, &params.task_description).await)
}

// ============================================================================
// get_plugin_data
// ============================================================================

#[derive(Debug, Deserialize)]
struct PluginDataParams {
    plugin_id: String,
    #[serde(default)]
    nodes: String,
    #[serde(default = "default_time_range_1h")]
    time_range: String,
}

fn get_plugin_data_tool() -> RegisteredTool {
    ToolBuilder::new("get_plugin_data")
        .description("Query and summarize the data published by a plugin, by registry id or name")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "plugin_id": {"type": "string", "description": "Plugin id (e.g. waggle/plugin-raingauge:0.4.1) or name"},
                "nodes": {"type": "string", "description": "Comma separated node ids; empty for all"},
                "time_range": {"type": "string", "default": "-1h"}
            },
            "required": ["plugin_id"]
        }))
        .category(ToolCategory::Read)
        .build(get_plugin_data_handler)
}

async fn get_plugin_data_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: PluginDataParams = parse_args(args)?;
    finish(plugin_data(&ctx, params).await)
}

async fn plugin_data(ctx: &ToolContext, params: PluginDataParams) -> ToolOutcome {
    let window = window(&params.time_range)?;
    let nodes = if params.nodes.trim().is_empty() {
        Vec::new()
    } else {
        parse_node_list(&params.nodes)?
    };
    let Some(plugin) = ctx.services.plugins.get(&params.plugin_id).await? else {
        return Ok(format!("Plugin not found: {}", params.plugin_id));
    };

    let records = query_pattern(ctx, &window, &plugin.data_pattern(), &nodes).await?;
    Ok(format_plugin_data(&plugin.name, Some(&plugin), &records))
}

// ============================================================================
// query_plugin_data_nl
// ============================================================================

#[derive(Debug, Deserialize)]
struct NlQueryParams {
    query: String,
}

fn query_plugin_data_nl_tool() -> RegisteredTool {
    ToolBuilder::new("query_plugin_data_nl")
        .description("Query plugin data in plain language, e.g. 'Show me cloud cover data from the last hour' or 'temperature readings from nodes W019, W020 in the last 30 minutes'")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        }))
        .category(ToolCategory::Read)
        .build(query_plugin_data_nl_handler)
}

async fn query_plugin_data_nl_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: NlQueryParams = parse_args(args)?;
    finish(plugin_data_nl(&ctx, params).await)
}

async fn plugin_data_nl(ctx: &ToolContext, params: NlQueryParams) -> ToolOutcome {
    let parsed = nl_query::parse(&params.query);
    let window = window(&parsed.time_range)?;
    info!(
        "Natural language query parsed: range {}, nodes {:?}, pattern {:?}, category {:?}",
        parsed.time_range, parsed.nodes, parsed.plugin_pattern, parsed.category
    );

    // Camera style requests name a data pattern directly.
    if let Some(pattern) = parsed.plugin_pattern {
        let records = query_pattern(ctx, &window, pattern, &parsed.nodes).await?;
        return Ok(format_plugin_data(pattern, None, &records));
    }

    let mut plugins = match parsed.category {
        Some(category) => ctx.services.plugins.by_keyword(category).await?,
        None => Vec::new(),
    };
    if plugins.is_empty() {
        plugins = ctx.services.plugins.search(&params.query, MAX_NL_PLUGINS).await?;
    }
    if plugins.is_empty() {
        return Ok(
            "No plugins found matching your query. Try using different keywords or be more specific."
                .to_string(),
        );
    }

    let mut sections = Vec::new();
    for plugin in plugins.iter().take(MAX_NL_PLUGINS) {
        let records = query_pattern(ctx, &window, &plugin.data_pattern(), &parsed.nodes).await?;
        sections.push(format_plugin_data(&plugin.name, Some(plugin), &records));
    }
    Ok(sections.join("\n\n"))
}

// ============================================================================
// create_plugin
// ============================================================================

#[derive(Debug, Deserialize)]
struct CreatePluginParams {
    description: String,
    name: String,
    #[serde(default)]
    use_gpu: bool,
    #[serde(default)]
    use_camera: bool,
    #[serde(default)]
    use_env_sensors: bool,
    #[serde(default)]
    use_audio: bool,
    #[serde(default)]
    packages: String,
    #[serde(default)]
    system_deps: String,
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn create_plugin_tool() -> RegisteredTool {
    ToolBuilder::new("create_plugin")
        .description("Create a new edge plugin scaffold (Dockerfile, sage.yaml, main.py, requirements.txt, README and science description) on the server, with deployment instructions")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "description": {"type": "string", "description": "What the plugin does"},
                "name": {"type": "string", "description": "Plugin name; spaces become dashes"},
                "use_gpu": {"type": "boolean", "default": false},
                "use_camera": {"type": "boolean", "default": false},
                "use_env_sensors": {"type": "boolean", "default": false},
                "use_audio": {"type": "boolean", "default": false},
                "packages": {"type": "string", "description": "Comma separated Python packages"},
                "system_deps": {"type": "string", "description": "Comma separated apt packages"}
            },
            "required": ["description", "name"]
        }))
        .access(Access::Authenticated)
        .category(ToolCategory::Write)
        .build(create_plugin_handler)
}

async fn create_plugin_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: CreatePluginParams = parse_args(args)?;
    ctx.require_credentials()?;
    finish(create_plugin(&ctx, params).await)
}

async fn create_plugin(ctx: &ToolContext, params: CreatePluginParams) -> ToolOutcome {
    let template = PluginTemplate::new(params.name.trim(), params.description.trim()).requirements(
        PluginRequirements {
            gpu: params.use_gpu,
            camera: params.use_camera,
            environmental_sensors: params.use_env_sensors,
            audio: params.use_audio,
            python_packages: comma_list(&params.packages),
            system_packages: comma_list(&params.system_deps),
        },
    );
    info!("Creating plugin {:?} for {}", template.name, ctx.caller());

    let generator = PluginGenerator::new(ctx.settings.plugin_output_dir.clone());
    let job_template = template.clone();
    let path = tokio::task::spawn_blocking(move || generator.generate(&job_template))
        .await
        .map_err(|e| ToolFailure(format!("❌ Error creating plugin: {}", e)))?
        .map_err(|e| ToolFailure(format!("❌ Error creating plugin: {:#}", e)))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| template.name.clone());
    let mut out = format!(
        "✅ Plugin '{}' created successfully at {}\n\n",
        template.name,
        path.display()
    );
    let _ = writeln!(out, "Deployment Information:");
    let _ = writeln!(out, "- Base image: {}", template.base_image());
    let _ = writeln!(out, "\nTo deploy on a node:");
    let _ = writeln!(out, "1. tar -czf {0}.tar.gz {0}/", name);
    let _ = writeln!(out, "2. scp {}.tar.gz waggle-dev-node-WXXX:~/", name);
    let _ = writeln!(out, "3. ssh waggle-dev-node-WXXX");
    let _ = writeln!(out, "4. tar -xzf {0}.tar.gz && cd {0}", name);
    let _ = writeln!(out, "5. sudo pluginctl build .");
    let _ = writeln!(out, "6. sudo pluginctl run .");
    out.push_str("\nReplace WXXX with your target node ID (e.g., W0B6).");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{text_of, Fixture};
    use super::*;
    use crate::data::record::test_support::record;
    use crate::plugins::models::PluginInput;
    use serde_json::json;

    fn plugin(name: &str, description: &str, keywords: &str) -> PluginMetadata {
        PluginMetadata {
            id: format!("waggle/{}:0.1.0", name),
            name: name.to_string(),
            namespace: "waggle".to_string(),
            version: "0.1.0".to_string(),
            description: description.to_string(),
            keywords: keywords.to_string(),
            ..Default::default()
        }
    }

    fn fixture() -> Fixture {
        let mut fixture = Fixture::new().with_records(vec![
            record(1, "env.raingauge.rint", 0.25, &[("vsn", "W023"), ("plugin", "waggle/plugin-raingauge:0.4.1")]),
            record(5, "env.raingauge.rint", 0.75, &[("vsn", "W027"), ("plugin", "waggle/plugin-raingauge:0.4.1")]),
        ]);
        let mut rain = plugin("plugin-raingauge", "Hydreon rain gauge reader", "rain, weather");
        rain.inputs = vec![PluginInput {
            id: "device".to_string(),
            input_type: "string".to_string(),
        }];
        fixture.plugins = vec![
            rain,
            plugin("imagesampler", "Takes camera snapshots", "camera, image"),
        ];
        fixture
    }

    #[tokio::test]
    async fn test_find_plugins() {
        let fixture = fixture();
        let (text, _) = text_of(
            find_plugins_for_task_handler(fixture.context(), json!({"task_description": "rain"}))
                .await,
        );
        assert!(text.starts_with("Found 1 plugins matching your task 'rain':"));
        assert!(text.contains("1. plugin-raingauge (v0.1.0):\n   Image: waggle/plugin-raingauge:0.1.0"));
        assert!(text.contains("   Parameters: device (string)"));

        let (text, _) = text_of(
            find_plugins_for_task_handler(fixture.context(), json!({"task_description": "lidar"}))
                .await,
        );
        assert!(text.starts_with("No plugins found matching 'lidar'."));
    }

    #[tokio::test]
    async fn test_plugin_data_summary() {
        let fixture = fixture();
        let (text, _) = text_of(
            get_plugin_data_handler(
                fixture.context(),
                json!({"plugin_id": "plugin-raingauge", "nodes": "W023,W027"}),
            )
            .await,
        );
        assert!(text.starts_with("📊 Data from plugin-raingauge:\nTotal records: 2"));
        assert!(text.contains("Nodes: W023, W027"));
        assert!(text.contains("  Average: 0.50"));

        let seen = fixture.data.seen.lock().unwrap();
        assert_eq!(seen[0].get("plugin"), Some(".*plugin-raingauge.*"));
        assert_eq!(seen[0].get("vsn"), Some("W023|W027"));
    }

    #[tokio::test]
    async fn test_plugin_data_unknown_plugin() {
        let fixture = fixture();
        let (text, is_error) = text_of(
            get_plugin_data_handler(fixture.context(), json!({"plugin_id": "nope"})).await,
        );
        assert!(!is_error);
        assert_eq!(text, "Plugin not found: nope");
    }

    #[tokio::test]
    async fn test_nl_query_by_category() {
        let fixture = fixture();
        let (text, _) = text_of(
            query_plugin_data_nl_handler(
                fixture.context(),
                json!({"query": "rain data from W023 in the last 2 hours"}),
            )
            .await,
        );
        assert!(text.starts_with("📊 Data from plugin-raingauge:\nTotal records: 1"));

        let seen = fixture.data.seen.lock().unwrap();
        assert_eq!(seen[0].get("vsn"), Some("W023"));
    }

    #[tokio::test]
    async fn test_nl_query_camera_pattern() {
        let fixture = fixture();
        let (text, _) = text_of(
            query_plugin_data_nl_handler(fixture.context(), json!({"query": "recent camera images"}))
                .await,
        );
        assert_eq!(text, "No data found for plugin .*imagesampler.*|.*camera.*");
    }

    fn create_args(name: &str) -> Value {
        json!({
            "name": name,
            "description": "Counts birds",
            "use_camera": true,
            "packages": "ultralytics, ,scipy",
            "system_deps": "ffmpeg"
        })
    }

    #[tokio::test]
    async fn test_create_plugin_writes_scaffold() {
        let fixture = Fixture::new().authenticated();
        let (text, is_error) =
            text_of(create_plugin_handler(fixture.context(), create_args("Bird Counter")).await);
        assert!(!is_error, "{}", text);

        let path = fixture.cache_dir.path().join("generated/bird-counter");
        assert!(text.starts_with(&format!(
            "✅ Plugin 'Bird Counter' created successfully at {}",
            path.display()
        )));
        assert!(text.contains("- Base image: waggle/plugin-base:1.1.1-ml\n"));
        assert!(text.contains("1. tar -czf bird-counter.tar.gz bird-counter/"));
        assert!(text.ends_with("Replace WXXX with your target node ID (e.g., W0B6)."));

        let requirements = std::fs::read_to_string(path.join("requirements.txt")).unwrap();
        assert!(requirements.contains("scipy\nultralytics"));
        let dockerfile = std::fs::read_to_string(path.join("Dockerfile")).unwrap();
        assert!(dockerfile.contains("    ffmpeg \\\n"));
    }

    #[tokio::test]
    async fn test_create_plugin_failures_are_tool_errors() {
        let fixture = Fixture::new().authenticated();
        let (_, is_error) =
            text_of(create_plugin_handler(fixture.context(), create_args("counter")).await);
        assert!(!is_error);

        let (text, is_error) =
            text_of(create_plugin_handler(fixture.context(), create_args("counter")).await);
        assert!(is_error);
        assert!(text.starts_with("❌ Error creating plugin:"));
        assert!(text.contains("already exists"));

        let (text, is_error) =
            text_of(create_plugin_handler(fixture.context(), create_args("../escape")).await);
        assert!(is_error);
        assert!(text.contains("Invalid plugin name"));
        assert!(!fixture.cache_dir.path().join("escape").exists());
    }

    #[tokio::test]
    async fn test_create_plugin_needs_credentials() {
        let fixture = Fixture::new();
        let result = create_plugin_handler(fixture.context(), create_args("counter")).await;
        assert!(matches!(result, Err(crate::mcp::protocol::McpError::Unauthorized)));
        assert!(!fixture.cache_dir.path().join("generated").exists());

        let tool = create_plugin_tool();
        assert_eq!(tool.access, Access::Authenticated);
        assert_eq!(tool.category, ToolCategory::Write);
    }
}
