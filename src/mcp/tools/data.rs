//! Sensor Data Tools
//!
//! Tools that query the time-series data API and summarize the records.

use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write;
use tracing::info;

use super::{
    default_time_range_1h, default_time_range_30m, finish, parse_args, sample_value, window,
    ToolFailure, ToolOutcome,
};
use crate::data::filter::{
    alternation, broader_job_pattern, job_keyword_pattern, CLOUD_PLUGIN_PATTERN,
    ENVIRONMENTAL_NAMES, IIO_NAMES, TEMPERATURE,
};
use crate::data::record::{group_stats, latest, newest, time_bounds, unique};
use crate::data::time_range::format_display;
use crate::data::{csv, normalize_node_id, wildcard, QueryFilter, Record, TimeWindow};
use crate::mcp::context::ToolContext;
use crate::mcp::registry::{McpRegistry, RegisteredTool, ToolBuilder, ToolCategory, ToolResult};

/// Register sensor data tools with the registry
pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(get_node_all_data_tool());
    registry.register_tool(get_node_iio_data_tool());
    registry.register_tool(get_environmental_summary_tool());
    registry.register_tool(list_available_nodes_tool());
    registry.register_tool(search_measurements_tool());
    registry.register_tool(get_node_temperature_tool());
    registry.register_tool(get_temperature_summary_tool());
    registry.register_tool(query_job_data_tool());
    registry.register_tool(get_cloud_images_tool());
    registry.register_tool(get_image_data_tool());
    registry.register_tool(export_data_csv_tool());
}

async fn run_query(
    ctx: &ToolContext,
    window: &TimeWindow,
    filter: &QueryFilter,
    context: &str,
) -> Result<Vec<Record>, ToolFailure> {
    ctx.services
        .data
        .query(ctx.credentials.as_ref(), window, filter)
        .await
        .map_err(|e| ToolFailure::upstream(context, &e))
}

/// Optional node argument: `None` when it selects every node.
fn node_arg(raw: &str) -> Option<String> {
    let node = normalize_node_id(raw);
    (!node.is_empty() && node != "*").then_some(node)
}

fn required_node(raw: &str) -> Result<String, ToolFailure> {
    node_arg(raw).ok_or_else(|| ToolFailure("node_id is required, e.g. W023".to_string()))
}

fn time_span(records: &[Record]) -> Option<(String, String)> {
    time_bounds(records).map(|(first, last)| (format_display(&first), format_display(&last)))
}

/// `  {ts} | Node {vsn} | {name} | Value: {v}` rows, newest first.
fn write_samples(out: &mut String, records: &[Record], n: usize, indent: &str) {
    for record in latest(records, n) {
        let _ = write!(
            out,
            "{}{} | Node {} | {}",
            indent,
            format_display(&record.timestamp),
            record.vsn().unwrap_or("N/A"),
            record.name
        );
        let _ = writeln!(out, " | Value: {}", sample_value(&record.value));
    }
}

fn plugin_key(record: &Record) -> Option<String> {
    record.plugin().map(str::to_string)
}

fn owned(rows: &[&Record]) -> Vec<Record> {
    rows.iter().map(|r| (*r).clone()).collect()
}

/// Per-plugin breakdown used by the search and cloud tools.
fn write_plugin_groups(out: &mut String, records: &[Record]) {
    let groups = crate::data::record::group_by(records, plugin_key);
    for (plugin, rows) in groups {
        let rows = owned(&rows);
        let _ = writeln!(out, "\n{}:", plugin);
        let _ = writeln!(out, "- Nodes: {}", unique(&rows, "vsn").join(", "));
        let _ = writeln!(out, "- Measurements: {}", unique(&rows, "name").join(", "));
        out.push_str("- Recent data:\n");
        write_samples(out, &rows, 3, "  ");
    }
}

fn write_counts(out: &mut String, records: &[Record]) {
    let _ = writeln!(out, "Total records: {}", records.len());
    let _ = writeln!(out, "Nodes reporting: {}", unique(records, "vsn").len());
    let _ = writeln!(out, "Plugins active: {}", unique(records, "plugin").len());
    let _ = writeln!(out, "Measurement types: {}", unique(records, "name").len());
}

// ============================================================================
// get_node_all_data
// ============================================================================

#[derive(Debug, Deserialize)]
struct NodeDataParams {
    #[serde(default)]
    node_id: String,
    #[serde(default = "default_time_range_30m")]
    time_range: String,
}

fn get_node_all_data_tool() -> RegisteredTool {
    ToolBuilder::new("get_node_all_data")
        .description("Get all available sensor data for a specific node, or all nodes if node_id is '*' or empty")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": {"type": "string", "description": "Node VSN such as W023; '*' or empty for all nodes"},
                "time_range": {"type": "string", "description": "Relative range like -30m, -1h, -2d", "default": "-30m"}
            }
        }))
        .category(ToolCategory::Read)
        .build(get_node_all_data_handler)
}

async fn get_node_all_data_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: NodeDataParams = parse_args(args)?;
    finish(node_all_data(&ctx, params).await)
}

async fn node_all_data(ctx: &ToolContext, params: NodeDataParams) -> ToolOutcome {
    let node = node_arg(&params.node_id);
    let node_label = node.clone().unwrap_or_else(|| "*".to_string());
    let window = window(&params.time_range)?;
    info!("Getting all data for node: {}", node_label);

    let filter = QueryFilter::new().node(&node_label);
    let records = run_query(
        ctx,
        &window,
        &filter,
        &format!("Error getting all data for node {}", node_label),
    )
    .await?;
    if records.is_empty() {
        return Ok(format!(
            "No data found for node {} in the last {}",
            node_label, window
        ));
    }

    let mut out = format!("All sensor data for node {} ({}):\n", node_label, window);
    let _ = writeln!(out, "Total measurements: {}", records.len());
    if let Some((start, end)) = time_span(&records) {
        let _ = writeln!(out, "Time range: {} to {}\n", start, end);
    }
    let groups = group_stats(&records, |r| {
        Some((r.name.clone(), r.sensor().unwrap_or("unknown").to_string()))
    });
    for ((name, sensor), stats) in groups {
        let _ = writeln!(out, "{} ({}):", name, sensor);
        let _ = writeln!(out, "  Count: {}", stats.count);
        let _ = writeln!(out, "  Range: {:.2} to {:.2}", stats.min, stats.max);
        let _ = writeln!(out, "  Average: {:.2}\n", stats.mean);
    }
    Ok(out)
}

// ============================================================================
// get_node_iio_data
// ============================================================================

fn get_node_iio_data_tool() -> RegisteredTool {
    ToolBuilder::new("get_node_iio_data")
        .description("Get IIO (Industrial I/O) sensor data for a specific node")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": {"type": "string", "description": "Node VSN such as W023"},
                "time_range": {"type": "string", "default": "-30m"}
            },
            "required": ["node_id"]
        }))
        .category(ToolCategory::Read)
        .build(get_node_iio_data_handler)
}

async fn get_node_iio_data_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: NodeDataParams = parse_args(args)?;
    finish(node_iio_data(&ctx, params).await)
}

async fn node_iio_data(ctx: &ToolContext, params: NodeDataParams) -> ToolOutcome {
    let node = required_node(&params.node_id)?;
    let window = window(&params.time_range)?;
    info!("Getting IIO data for node: {}", node);

    let filter = QueryFilter::new().plugin(".*plugin-iio.*").node(&node);
    let records = run_query(
        ctx,
        &window,
        &filter,
        &format!("Error getting IIO data for node {}", node),
    )
    .await?;
    if records.is_empty() {
        return Ok(format!(
            "No IIO data found for node {} in the last {}",
            node, window
        ));
    }

    let mut out = format!("IIO sensor data for node {} ({}):\n", node, window);
    let _ = writeln!(out, "Total IIO measurements: {}\n", records.len());

    let known: Vec<&str> = IIO_NAMES.iter().chain(ENVIRONMENTAL_NAMES.iter()).copied().collect();
    for measurement in &known {
        let rows: Vec<Record> = records
            .iter()
            .filter(|r| r.name == *measurement)
            .cloned()
            .collect();
        let by_sensor = group_stats(&rows, |r| Some(r.sensor().unwrap_or("unknown").to_string()));
        if by_sensor.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}:", measurement);
        for (sensor, stats) in by_sensor {
            let _ = writeln!(
                out,
                "  {}: {} readings, range: {:.2}-{:.2}, avg: {:.2}",
                sensor, stats.count, stats.min, stats.max, stats.mean
            );
        }
        out.push('\n');
    }

    let others: Vec<String> = unique(&records, "name")
        .into_iter()
        .filter(|name| !known.contains(&name.as_str()))
        .collect();
    if !others.is_empty() {
        let _ = writeln!(out, "Other IIO measurements found: {}", others.join(", "));
    }
    Ok(out)
}

// ============================================================================
// get_environmental_summary
// ============================================================================

#[derive(Debug, Deserialize)]
struct EnvironmentalParams {
    #[serde(default)]
    node_id: String,
    #[serde(default = "default_time_range_1h")]
    time_range: String,
}

fn get_environmental_summary_tool() -> RegisteredTool {
    ToolBuilder::new("get_environmental_summary")
        .description("Get environmental data summary (temperature, humidity, pressure) for a node or all nodes")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": {"type": "string", "description": "Node VSN; empty for all nodes"},
                "time_range": {"type": "string", "default": "-1h"}
            }
        }))
        .category(ToolCategory::Read)
        .build(get_environmental_summary_handler)
}

async fn get_environmental_summary_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: EnvironmentalParams = parse_args(args)?;
    finish(environmental_summary(&ctx, params).await)
}

async fn environmental_summary(ctx: &ToolContext, params: EnvironmentalParams) -> ToolOutcome {
    let node = node_arg(&params.node_id);
    let window = window(&params.time_range)?;

    let mut filter = QueryFilter::new().name(alternation(&ENVIRONMENTAL_NAMES));
    if let Some(node) = &node {
        filter = filter.node(node);
    }
    let records = run_query(ctx, &window, &filter, "Error getting environmental summary").await?;
    if records.is_empty() {
        let target = node
            .as_ref()
            .map(|n| format!("node {}", n))
            .unwrap_or_else(|| "any nodes".to_string());
        return Ok(format!(
            "No environmental data found for {} in the last {}",
            target, window
        ));
    }

    let mut out = format!(
        "Environmental data summary ({}, {}):\n\n",
        node.as_deref().unwrap_or("all nodes"),
        window
    );
    let groups = group_stats(&records, |r| {
        Some((
            r.vsn().unwrap_or("unknown").to_string(),
            r.name.clone(),
            r.sensor().unwrap_or("unknown").to_string(),
        ))
    });
    let mut current: Option<String> = None;
    for ((vsn, name, sensor), stats) in groups {
        if current.as_deref() != Some(vsn.as_str()) {
            let _ = writeln!(out, "\nNode {}:", vsn);
            current = Some(vsn);
        }
        let _ = writeln!(
            out,
            "  {} ({}): {} readings, {:.2}-{:.2} (avg: {:.2})",
            name, sensor, stats.count, stats.min, stats.max, stats.mean
        );
    }
    Ok(out)
}

// ============================================================================
// list_available_nodes
// ============================================================================

#[derive(Debug, Deserialize)]
struct TimeRangeParams {
    #[serde(default = "default_time_range_1h")]
    time_range: String,
}

fn list_available_nodes_tool() -> RegisteredTool {
    ToolBuilder::new("list_available_nodes")
        .description("List sensor nodes that reported environmental data recently and when they were last seen")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "time_range": {"type": "string", "default": "-1h"}
            }
        }))
        .category(ToolCategory::Read)
        .build(list_available_nodes_handler)
}

async fn list_available_nodes_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: TimeRangeParams = parse_args(args)?;
    finish(list_available_nodes(&ctx, params).await)
}

async fn list_available_nodes(ctx: &ToolContext, params: TimeRangeParams) -> ToolOutcome {
    let window = window(&params.time_range)?;
    let filter = QueryFilter::new().name(alternation(&ENVIRONMENTAL_NAMES));
    let records = run_query(ctx, &window, &filter, "Error listing nodes").await?;
    if records.is_empty() {
        return Ok("No active nodes found in the specified time range.".to_string());
    }

    let by_node = crate::data::record::group_by(&records, |r| r.vsn().map(str::to_string));
    let mut out = format!("Available SAGE Nodes ({} total):\n\n", by_node.len());
    for (vsn, rows) in &by_node {
        let last_seen = rows
            .iter()
            .map(|r| r.timestamp)
            .max()
            .map(|t| format_display(&t))
            .unwrap_or_default();
        let _ = writeln!(out, "- {} (last seen {})", vsn, last_seen);
    }
    out.push_str("\n💡 For detailed node information, use get_node_info(node_id)");
    out.push_str("\n💡 For recent sensor activity, use get_environmental_summary()");
    Ok(out)
}

// ============================================================================
// search_measurements
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchMeasurementsParams {
    measurement_pattern: String,
    #[serde(default)]
    node_id: String,
    #[serde(default = "default_time_range_30m")]
    time_range: String,
}

fn search_measurements_tool() -> RegisteredTool {
    ToolBuilder::new("search_measurements")
        .description("Search for measurements using a pattern (regex supported). Matches plugin names first, then measurement names")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "measurement_pattern": {"type": "string", "description": "Pattern such as 'iio', 'env.temperature' or 'cloud|rain'"},
                "node_id": {"type": "string", "description": "Node VSN; empty for all nodes"},
                "time_range": {"type": "string", "default": "-30m"}
            },
            "required": ["measurement_pattern"]
        }))
        .category(ToolCategory::Read)
        .build(search_measurements_handler)
}

async fn search_measurements_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: SearchMeasurementsParams = parse_args(args)?;
    finish(search_measurements(&ctx, params).await)
}

async fn search_measurements(ctx: &ToolContext, params: SearchMeasurementsParams) -> ToolOutcome {
    let window = window(&params.time_range)?;
    let node = node_arg(&params.node_id);
    let pattern = wildcard(&params.measurement_pattern);
    if pattern.is_empty() {
        return Err(ToolFailure("measurement_pattern must not be empty".to_string()));
    }
    info!("Searching for measurements matching: {}", pattern);

    let base = match &node {
        Some(node) => QueryFilter::new().node(node),
        None => QueryFilter::new(),
    };
    let context = "Error searching measurements";
    let mut records = run_query(ctx, &window, &base.clone().plugin(pattern.clone()), context).await?;
    let by_plugin = !records.is_empty();
    if records.is_empty() {
        records = run_query(ctx, &window, &base.name(pattern), context).await?;
    }
    if records.is_empty() {
        let node_text = node
            .map(|n| format!(" for node {}", n))
            .unwrap_or_default();
        return Ok(format!(
            "No measurements matching '{}'{} found in the last {}",
            params.measurement_pattern, node_text, window
        ));
    }

    let mut out = format!(
        "Found {} records matching '{}':\n",
        records.len(),
        params.measurement_pattern
    );
    let _ = writeln!(out, "Time range: {}", window);
    let plugins = unique(&records, "plugin");
    if by_plugin && !plugins.is_empty() {
        let _ = writeln!(out, "\nPlugins found ({}):", plugins.len());
        write_plugin_groups(&mut out, &records);
    } else {
        let groups = crate::data::record::group_by(&records, |r| Some(r.name.clone()));
        let _ = writeln!(out, "\nMeasurements found ({}):", groups.len());
        for (name, rows) in groups {
            let rows = owned(&rows);
            let _ = writeln!(out, "\n{}:", name);
            let _ = writeln!(out, "- Nodes: {}", unique(&rows, "vsn").join(", "));
            out.push_str("- Recent data:\n");
            write_samples(&mut out, &rows, 3, "  ");
        }
    }
    Ok(out)
}

// ============================================================================
// get_node_temperature / get_temperature_summary
// ============================================================================

fn default_sensor() -> String {
    "bme680".to_string()
}

fn sensor_label(sensor: &str) -> String {
    match sensor {
        "bme680" => "environment (bme680)".to_string(),
        "bme280" => "internal/hardware (bme280)".to_string(),
        other => other.to_string(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Deserialize)]
struct NodeTemperatureParams {
    node_id: String,
    #[serde(default = "default_sensor")]
    sensor_type: String,
}

fn get_node_temperature_tool() -> RegisteredTool {
    ToolBuilder::new("get_node_temperature")
        .description("Get current temperature for a node over the last hour. Defaults to the environment sensor (bme680); use sensor_type='bme280' for internal/hardware temperature")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": {"type": "string", "description": "Node VSN such as W023"},
                "sensor_type": {"type": "string", "default": "bme680"}
            },
            "required": ["node_id"]
        }))
        .category(ToolCategory::Read)
        .build(get_node_temperature_handler)
}

async fn get_node_temperature_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: NodeTemperatureParams = parse_args(args)?;
    finish(node_temperature(&ctx, params).await)
}

async fn node_temperature(ctx: &ToolContext, params: NodeTemperatureParams) -> ToolOutcome {
    let node = required_node(&params.node_id)?;
    let window = window("-1h")?;
    let filter = QueryFilter::new()
        .name(TEMPERATURE)
        .node(&node)
        .sensor(params.sensor_type.clone());
    let records = run_query(
        ctx,
        &window,
        &filter,
        &format!("Error getting temperature for node {}", node),
    )
    .await?;
    let label = sensor_label(&params.sensor_type);
    let (Some(stats), Some(last)) = (crate::data::record::stats(&records), newest(&records))
    else {
        return Ok(format!(
            "No {} temperature data found for node {} in the last hour",
            label, node
        ));
    };

    Ok(format!(
        "{} temperature data for node {}:\n\
         - Latest reading: {}°C (sensor: {})\n\
         - Average over last hour: {:.2}°C\n\
         - Min/Max: {:.2}°C / {:.2}°C\n\
         - Total readings: {}\n\
         - Sensors active: {}\n\
         - Last updated: {}",
        capitalize(&label),
        node,
        sample_value(&last.value),
        last.sensor().unwrap_or("unknown"),
        stats.mean,
        stats.min,
        stats.max,
        records.len(),
        unique(&records, "sensor").join(", "),
        format_display(&last.timestamp)
    ))
}

#[derive(Debug, Deserialize)]
struct TemperatureSummaryParams {
    #[serde(default = "default_time_range_1h")]
    time_range: String,
    #[serde(default = "default_sensor")]
    sensor_type: String,
}

fn get_temperature_summary_tool() -> RegisteredTool {
    ToolBuilder::new("get_temperature_summary")
        .description("Summary of temperature readings across all nodes. Defaults to the environment sensor (bme680)")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "time_range": {"type": "string", "default": "-1h"},
                "sensor_type": {"type": "string", "default": "bme680"}
            }
        }))
        .category(ToolCategory::Read)
        .build(get_temperature_summary_handler)
}

async fn get_temperature_summary_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: TemperatureSummaryParams = parse_args(args)?;
    finish(temperature_summary(&ctx, params).await)
}

async fn temperature_summary(ctx: &ToolContext, params: TemperatureSummaryParams) -> ToolOutcome {
    let window = window(&params.time_range)?;
    let filter = QueryFilter::new()
        .name(TEMPERATURE)
        .sensor(params.sensor_type.clone());
    let records = run_query(ctx, &window, &filter, "Error getting temperature summary").await?;
    let label = sensor_label(&params.sensor_type);
    let Some(stats) = crate::data::record::stats(&records) else {
        return Ok(format!(
            "No {} temperature data available in the last {}",
            label, window
        ));
    };

    Ok(format!(
        "{} Temperature Summary (Last {}):\n\
         - Total readings: {}\n\
         - Unique sensors: {}\n\
         - Average temperature: {:.2}°C\n\
         - Min temperature: {:.2}°C\n\
         - Max temperature: {:.2}°C",
        capitalize(&label),
        window,
        records.len(),
        unique(&records, "vsn").len(),
        stats.mean,
        stats.min,
        stats.max
    ))
}

// ============================================================================
// query_job_data
// ============================================================================

fn default_data_type() -> String {
    "upload".to_string()
}

#[derive(Debug, Deserialize)]
struct JobDataParams {
    job_name: String,
    #[serde(default)]
    node_id: String,
    #[serde(default = "default_time_range_30m")]
    time_range: String,
    #[serde(default = "default_data_type")]
    data_type: String,
}

fn query_job_data_tool() -> RegisteredTool {
    ToolBuilder::new("query_job_data")
        .description("Query data produced by a running job. The job name is mapped to likely plugin names (audio, cloud, camera, weather, ...)")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "job_name": {"type": "string", "description": "Job or plugin name, e.g. 'cloud-cover-job'"},
                "node_id": {"type": "string", "description": "Node VSN; empty for all nodes"},
                "time_range": {"type": "string", "default": "-30m"},
                "data_type": {"type": "string", "description": "Measurement name filter; 'upload' means any", "default": "upload"}
            },
            "required": ["job_name"]
        }))
        .category(ToolCategory::Read)
        .build(query_job_data_handler)
}

async fn query_job_data_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: JobDataParams = parse_args(args)?;
    finish(job_data(&ctx, params).await)
}

async fn job_data(ctx: &ToolContext, params: JobDataParams) -> ToolOutcome {
    let window = window(&params.time_range)?;
    let job_name = params.job_name.trim();
    if job_name.is_empty() {
        return Err(ToolFailure("job_name must not be empty".to_string()));
    }

    let mut base = QueryFilter::new();
    if let Some(node) = node_arg(&params.node_id) {
        base = base.node(&node);
    }
    if params.data_type != "upload" {
        base = base.name(params.data_type.clone());
    }
    let context = "Error querying job data";

    let pattern = job_keyword_pattern(job_name);
    info!("Querying data for job {} with plugin pattern {}", job_name, pattern);
    let mut records = run_query(ctx, &window, &base.clone().plugin(pattern), context).await?;
    if records.is_empty() {
        if let Some(broader) = broader_job_pattern(job_name) {
            info!("No data with mapped pattern, trying broader pattern {}", broader);
            records = run_query(ctx, &window, &base.plugin(broader), context).await?;
        }
    }
    if records.is_empty() {
        return Ok(format!(
            "No data found for job '{}' in the last {}. The job may still be starting up or not producing data yet.\n\n\
             💡 Tip: Try using search_measurements() to see what plugins are actually running on this node.",
            job_name, window
        ));
    }

    let mut out = format!(
        "📊 Job Data Summary for '{}' (last {}):\n\n",
        job_name, window
    );
    write_counts(&mut out, &records);
    let _ = writeln!(out, "\nPlugins: {}", unique(&records, "plugin").join(", "));
    let _ = writeln!(out, "Measurements: {}", unique(&records, "name").join(", "));
    if let Some((start, end)) = time_span(&records) {
        let _ = writeln!(out, "\nTime range: {} to {}", start, end);
    }
    out.push_str("\nRecent data sample:\n");
    for record in latest(&records, 5) {
        let _ = writeln!(
            out,
            "  {} | Node {} | {} | Value: {} | Plugin: {}",
            format_display(&record.timestamp),
            record.vsn().unwrap_or("N/A"),
            record.name,
            sample_value(&record.value),
            record.plugin().unwrap_or("N/A")
        );
    }
    Ok(out)
}

// ============================================================================
// get_cloud_images / get_image_data
// ============================================================================

#[derive(Debug, Deserialize)]
struct CloudImagesParams {
    #[serde(default = "default_time_range_1h")]
    time_range: String,
    #[serde(default)]
    node_id: String,
}

fn get_cloud_images_tool() -> RegisteredTool {
    ToolBuilder::new("get_cloud_images")
        .description("Get recent cloud images and cloud related data (cloud cover, cloud motion, image samplers). Searches all nodes unless node_id is given")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "time_range": {"type": "string", "default": "-1h"},
                "node_id": {"type": "string", "description": "Node VSN; empty for all nodes"}
            }
        }))
        .category(ToolCategory::Read)
        .build(get_cloud_images_handler)
}

async fn get_cloud_images_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: CloudImagesParams = parse_args(args)?;
    finish(cloud_images(&ctx, params).await)
}

async fn cloud_images(ctx: &ToolContext, params: CloudImagesParams) -> ToolOutcome {
    let window = window(&params.time_range)?;
    let node = node_arg(&params.node_id);
    let mut filter = QueryFilter::new().plugin(CLOUD_PLUGIN_PATTERN);
    if let Some(node) = &node {
        filter = filter.node(node);
    }
    let records = run_query(ctx, &window, &filter, "Error getting cloud images").await?;
    if records.is_empty() {
        let node_text = node
            .map(|n| format!(" for node {}", n))
            .unwrap_or_default();
        return Ok(format!(
            "No cloud images found{} in the last {}",
            node_text, window
        ));
    }

    let mut out = format!("Cloud images found (last {}):\n\n", window);
    write_counts(&mut out, &records);
    write_plugin_groups(&mut out, &records);
    Ok(out)
}

fn default_plugin_pattern() -> String {
    ".*".to_string()
}

#[derive(Debug, Deserialize)]
struct ImageDataParams {
    #[serde(default = "default_time_range_1h")]
    time_range: String,
    #[serde(default)]
    node_id: String,
    #[serde(default = "default_plugin_pattern")]
    plugin_pattern: String,
}

fn get_image_data_tool() -> RegisteredTool {
    ToolBuilder::new("get_image_data")
        .description("Get recent image data from nodes, filtered by node and plugin pattern. Upload values are storage URLs that can be fetched through /proxy/image")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "time_range": {"type": "string", "default": "-1h"},
                "node_id": {"type": "string", "description": "Node VSN; empty for all nodes"},
                "plugin_pattern": {"type": "string", "description": "Plugin pattern, e.g. 'imagesampler|yolo'", "default": ".*"}
            }
        }))
        .category(ToolCategory::Read)
        .build(get_image_data_handler)
}

async fn get_image_data_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: ImageDataParams = parse_args(args)?;
    finish(image_data(&ctx, params).await)
}

async fn image_data(ctx: &ToolContext, params: ImageDataParams) -> ToolOutcome {
    let window = window(&params.time_range)?;
    let node = node_arg(&params.node_id);
    let pattern = wildcard(&params.plugin_pattern);
    let pattern = if pattern.is_empty() {
        default_plugin_pattern()
    } else {
        pattern
    };
    let mut filter = QueryFilter::new().plugin(pattern);
    if let Some(node) = &node {
        filter = filter.node(node);
    }
    let records = run_query(ctx, &window, &filter, "Error getting image data").await?;
    if records.is_empty() {
        let node_text = node
            .map(|n| format!(" for node {}", n))
            .unwrap_or_default();
        let pattern_text = if params.plugin_pattern != ".*" {
            format!(" matching pattern '{}'", params.plugin_pattern)
        } else {
            String::new()
        };
        return Ok(format!(
            "No image data found{}{} in the last {}",
            node_text, pattern_text, window
        ));
    }

    let mut out = format!("Image data found (last {}):\n\n", window);
    let _ = writeln!(out, "Total records: {}", records.len());
    let _ = writeln!(out, "Nodes reporting: {}", unique(&records, "vsn").len());
    let plugins = unique(&records, "plugin");
    let _ = writeln!(out, "Plugins active: {}", plugins.len());
    let _ = writeln!(out, "\nPlugins: {}", plugins.join(", "));
    if let Some((start, end)) = time_span(&records) {
        let _ = writeln!(out, "Data range: {} to {}", start, end);
    }

    out.push_str("\nRecent data by plugin:\n");
    let groups = crate::data::record::group_by(&records, plugin_key);
    for (plugin, rows) in groups {
        let rows = owned(&rows);
        let _ = writeln!(out, "\nPlugin: {}", plugin);
        let _ = writeln!(out, "  Records: {}", rows.len());
        let _ = writeln!(out, "  Nodes: {}", unique(&rows, "vsn").join(", "));
        out.push_str("  Recent data:\n");
        for record in latest(&rows, 3) {
            let _ = writeln!(
                out,
                "    {} | Node: {} | {} | Value: {}",
                format_display(&record.timestamp),
                record.vsn().unwrap_or("N/A"),
                record.name,
                sample_value(&record.value)
            );
        }
    }
    Ok(out)
}

// ============================================================================
// export_data_csv
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExportParams {
    #[serde(default)]
    plugin: String,
    #[serde(default)]
    measurement: String,
    #[serde(default)]
    node_id: String,
    #[serde(default = "default_time_range_30m")]
    time_range: String,
}

fn export_data_csv_tool() -> RegisteredTool {
    ToolBuilder::new("export_data_csv")
        .description("Export raw records as CSV (timestamp, name, value and meta columns). Give a plugin pattern, a measurement name, or both")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "plugin": {"type": "string", "description": "Plugin pattern, e.g. 'plugin-iio'"},
                "measurement": {"type": "string", "description": "Measurement name, e.g. env.temperature"},
                "node_id": {"type": "string", "description": "Node VSN; empty for all nodes"},
                "time_range": {"type": "string", "default": "-30m"}
            }
        }))
        .category(ToolCategory::Read)
        .build(export_data_csv_handler)
}

async fn export_data_csv_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: ExportParams = parse_args(args)?;
    finish(export_data_csv(&ctx, params).await)
}

async fn export_data_csv(ctx: &ToolContext, params: ExportParams) -> ToolOutcome {
    let plugin = params.plugin.trim();
    let measurement = params.measurement.trim();
    if plugin.is_empty() && measurement.is_empty() {
        return Err(ToolFailure(
            "Provide a plugin pattern or a measurement name to export".to_string(),
        ));
    }
    let window = window(&params.time_range)?;

    let mut filter = QueryFilter::new();
    if !plugin.is_empty() {
        filter = filter.plugin(wildcard(plugin));
    }
    if !measurement.is_empty() {
        filter = filter.name(measurement);
    }
    if let Some(node) = node_arg(&params.node_id) {
        filter = filter.node(&node);
    }
    let mut records = run_query(ctx, &window, &filter, "Error exporting data").await?;
    if records.is_empty() {
        return Ok(format!("No data to export in the last {}", window));
    }

    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let total = records.len();
    let max_rows = ctx.settings.max_csv_rows;
    let truncated = total > max_rows;
    if truncated {
        // Keep the most recent rows.
        records.drain(..total - max_rows);
    }
    let mut out = csv::to_csv(&records);
    if truncated {
        let _ = writeln!(
            out,
            "# truncated: showing the latest {} of {} rows",
            max_rows, total
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{text_of, Fixture};
    use super::*;
    use crate::data::record::test_support::record;
    use serde_json::json;

    fn env_records() -> Vec<Record> {
        vec![
            record(1, TEMPERATURE, 20.0, &[("vsn", "W023"), ("sensor", "bme680")]),
            record(2, TEMPERATURE, 22.0, &[("vsn", "W023"), ("sensor", "bme680")]),
            record(3, TEMPERATURE, 30.0, &[("vsn", "W024"), ("sensor", "bme280")]),
            record(
                4,
                "env.relative_humidity",
                55.5,
                &[("vsn", "W024"), ("sensor", "bme680")],
            ),
        ]
    }

    #[tokio::test]
    async fn test_node_all_data_summary() {
        let fixture = Fixture::new().with_records(env_records());
        let (text, is_error) = text_of(
            get_node_all_data_handler(fixture.context(), json!({"node_id": "w023"})).await,
        );
        assert!(!is_error);
        assert!(text.starts_with("All sensor data for node W023 (-30m):"));
        assert!(text.contains("Total measurements: 2"));
        assert!(text.contains("env.temperature (bme680):\n  Count: 2\n  Range: 20.00 to 22.00\n  Average: 21.00"));
    }

    #[tokio::test]
    async fn test_node_all_data_empty_and_invalid_range() {
        let fixture = Fixture::new();
        let (text, is_error) =
            text_of(get_node_all_data_handler(fixture.context(), json!({})).await);
        assert!(!is_error);
        assert_eq!(text, "No data found for node * in the last -30m");

        let (text, is_error) = text_of(
            get_node_all_data_handler(fixture.context(), json!({"time_range": "soon"})).await,
        );
        assert!(is_error);
        assert!(text.starts_with("Invalid time range"));
    }

    #[tokio::test]
    async fn test_environmental_summary_groups_by_node() {
        let fixture = Fixture::new().with_records(env_records());
        let (text, _) =
            text_of(get_environmental_summary_handler(fixture.context(), json!({})).await);
        assert!(text.starts_with("Environmental data summary (all nodes, -1h):"));
        assert!(text.contains("\nNode W023:\n  env.temperature (bme680): 2 readings, 20.00-22.00 (avg: 21.00)"));
        assert!(text.contains("\nNode W024:\n  env.relative_humidity (bme680): 1 readings"));
    }

    #[tokio::test]
    async fn test_node_temperature_uses_sensor_filter() {
        let fixture = Fixture::new().with_records(env_records());
        let (text, _) = text_of(
            get_node_temperature_handler(fixture.context(), json!({"node_id": "W023"})).await,
        );
        assert!(text.starts_with("Environment (bme680) temperature data for node W023:"));
        assert!(text.contains("- Latest reading: 22.00°C (sensor: bme680)"));
        assert!(text.contains("- Total readings: 2"));

        let seen = fixture.data.seen.lock().unwrap();
        assert_eq!(seen[0].get("sensor"), Some("bme680"));
        assert_eq!(seen[0].get("name"), Some(TEMPERATURE));
    }

    #[tokio::test]
    async fn test_temperature_summary() {
        let fixture = Fixture::new().with_records(env_records());
        let (text, _) = text_of(
            get_temperature_summary_handler(fixture.context(), json!({"sensor_type": "bme280"}))
                .await,
        );
        assert!(text.starts_with("Internal/hardware (bme280) Temperature Summary (Last -1h):"));
        assert!(text.contains("- Max temperature: 30.00°C"));
    }

    #[tokio::test]
    async fn test_search_measurements_falls_back_to_name() {
        let fixture = Fixture::new().with_records(env_records());
        let (text, _) = text_of(
            search_measurements_handler(
                fixture.context(),
                json!({"measurement_pattern": "humidity"}),
            )
            .await,
        );
        assert!(text.starts_with("Found 1 records matching 'humidity':"));
        assert!(text.contains("Measurements found (1):"));

        let seen = fixture.data.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].get("plugin"), Some(".*humidity.*"));
        assert_eq!(seen[1].get("name"), Some(".*humidity.*"));
    }

    #[tokio::test]
    async fn test_job_data_summary_and_broader_fallback() {
        let records = vec![
            record(1, "env.raingauge.rint", 0.5, &[("vsn", "W01"), ("plugin", "waggle/plugin-raingauge:0.4")]),
            record(2, "env.raingauge.rint", 0.7, &[("vsn", "W01"), ("plugin", "waggle/plugin-raingauge:0.4")]),
        ];
        let fixture = Fixture::new().with_records(records);
        let (text, _) = text_of(
            query_job_data_handler(fixture.context(), json!({"job_name": "rain-watch"})).await,
        );
        assert!(text.starts_with("📊 Job Data Summary for 'rain-watch' (last -30m):"));
        assert!(text.contains("Total records: 2\nNodes reporting: 1\nPlugins active: 1"));
        assert!(text.contains("| Value: 0.70 | Plugin: waggle/plugin-raingauge:0.4"));
    }

    #[tokio::test]
    async fn test_job_data_empty() {
        let fixture = Fixture::new();
        let (text, _) = text_of(
            query_job_data_handler(fixture.context(), json!({"job_name": "mystery-job"})).await,
        );
        assert!(text.starts_with("No data found for job 'mystery-job' in the last -30m."));
        // Mapped pattern first, then the broader word pattern.
        assert_eq!(fixture.data.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_error_result() {
        let fixture = Fixture::new();
        let ctx = {
            let mut ctx = fixture.context();
            ctx.services.data = std::sync::Arc::new(super::super::test_support::FakeData {
                fail: true,
                ..Default::default()
            });
            ctx
        };
        let (text, is_error) = text_of(get_cloud_images_handler(ctx, json!({})).await);
        assert!(is_error);
        assert!(text.starts_with("Error getting cloud images: data request timed out"));
    }

    #[tokio::test]
    async fn test_export_csv_truncates() {
        let fixture = Fixture::new().with_records(env_records());
        let mut ctx = fixture.context();
        ctx.settings.max_csv_rows = 2;
        let (text, _) = text_of(
            export_data_csv_handler(ctx, json!({"measurement": TEMPERATURE})).await,
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,name,value,meta.sensor,meta.vsn");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("# truncated: showing the latest 2 of 3 rows"));

        let (text, is_error) = text_of(export_data_csv_handler(fixture.context(), json!({})).await);
        assert!(is_error);
        assert!(text.contains("plugin pattern or a measurement"));
    }

    #[tokio::test]
    async fn test_missing_required_argument_is_invalid_params() {
        let fixture = Fixture::new();
        let err = search_measurements_handler(fixture.context(), json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32602);
    }
}
