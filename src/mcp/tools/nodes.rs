//! Node Catalog Tools
//!
//! Node and sensor lookups against the manifest service, plus statistics
//! over the nodes of a location.

use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write;
use tracing::{debug, info};

use super::{default_time_range_1h, finish, parse_args, window, ToolFailure, ToolOutcome};
use crate::catalog::format;
use crate::catalog::location::{is_rain_gauge, rain_gauge_meta, MAX_STAT_NODES};
use crate::catalog::{nodes_in_location, NodeManifest, StatKind, ValueFilter};
use crate::data::filter::{RAINGAUGE_PLUGIN_PATTERN, TEMPERATURE};
use crate::data::node::validate_vsn;
use crate::data::time_range::format_display;
use crate::data::{normalize_node_id, QueryFilter, Record};
use crate::mcp::context::ToolContext;
use crate::mcp::registry::{McpRegistry, RegisteredTool, ToolBuilder, ToolCategory, ToolResult};

/// Register node catalog tools with the registry
pub fn register_tools(registry: &mut McpRegistry) {
    registry.register_tool(get_node_info_tool());
    registry.register_tool(list_all_nodes_tool());
    registry.register_tool(get_sensor_details_tool());
    registry.register_tool(get_nodes_by_location_tool());
    registry.register_tool(get_measurement_stat_by_location_tool());
}

async fn all_nodes(ctx: &ToolContext, context: &str) -> Result<Vec<NodeManifest>, ToolFailure> {
    ctx.services
        .manifests
        .list_nodes()
        .await
        .map_err(|e| ToolFailure::upstream(context, &e))
}

// ============================================================================
// get_node_info
// ============================================================================

#[derive(Debug, Deserialize)]
struct NodeInfoParams {
    node_id: String,
}

fn get_node_info_tool() -> RegisteredTool {
    ToolBuilder::new("get_node_info")
        .description("Get detailed information about a specific SAGE node, including its sensors, location, and hardware")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "node_id": {"type": "string", "description": "Node VSN such as W023"}
            },
            "required": ["node_id"]
        }))
        .category(ToolCategory::Read)
        .build(get_node_info_handler)
}

async fn get_node_info_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: NodeInfoParams = parse_args(args)?;
    finish(node_info(&ctx, params).await)
}

async fn node_info(ctx: &ToolContext, params: NodeInfoParams) -> ToolOutcome {
    let vsn = validate_vsn(&normalize_node_id(&params.node_id))?;
    info!("Getting detailed node info for: {}", vsn);

    let detail = ctx.services.manifests.node_detail(&vsn).await.map_err(|e| {
        ToolFailure::upstream(
            &format!("Error getting detailed information for node {}", vsn),
            &e,
        )
    })?;
    Ok(format::node_detail(&vsn, &detail))
}

// ============================================================================
// list_all_nodes
// ============================================================================

fn list_all_nodes_tool() -> RegisteredTool {
    ToolBuilder::new("list_all_nodes")
        .description("List all SAGE nodes and their basic information")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {}
        }))
        .category(ToolCategory::Read)
        .build(list_all_nodes_handler)
}

async fn list_all_nodes_handler(ctx: ToolContext, _args: Value) -> ToolResult {
    finish(
        all_nodes(&ctx, "Error listing all nodes")
            .await
            .map(|nodes| format::node_list(&nodes)),
    )
}

// ============================================================================
// get_sensor_details
// ============================================================================

#[derive(Debug, Deserialize)]
struct SensorDetailsParams {
    sensor_type: String,
}

fn get_sensor_details_tool() -> RegisteredTool {
    ToolBuilder::new("get_sensor_details")
        .description("Get detailed information about a type of sensor used in SAGE nodes (matches hardware id, model and capabilities)")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "sensor_type": {"type": "string", "description": "e.g. bme680, camera, rain"}
            },
            "required": ["sensor_type"]
        }))
        .category(ToolCategory::Read)
        .build(get_sensor_details_handler)
}

async fn get_sensor_details_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: SensorDetailsParams = parse_args(args)?;
    finish(sensor_details(&ctx, params).await)
}

async fn sensor_details(ctx: &ToolContext, params: SensorDetailsParams) -> ToolOutcome {
    let query = params.sensor_type.trim();
    if query.is_empty() {
        return Err(ToolFailure("Error: No sensor type provided".to_string()));
    }
    info!("Getting sensor details for type: {}", query);

    let sensors = ctx
        .services
        .manifests
        .sensors()
        .await
        .map_err(|e| ToolFailure::upstream("Error getting sensor details", &e))?;
    let matching: Vec<_> = sensors.iter().filter(|s| s.matches(query)).collect();
    if matching.is_empty() {
        return Ok(format!(
            "No sensors found matching '{}'. Try a more general search term or check the spelling.",
            query
        ));
    }
    Ok(format::sensor_matches(query, &matching))
}

// ============================================================================
// get_nodes_by_location
// ============================================================================

#[derive(Debug, Deserialize)]
struct LocationParams {
    location: String,
}

fn get_nodes_by_location_tool() -> RegisteredTool {
    ToolBuilder::new("get_nodes_by_location")
        .description("Find nodes in a geographic location: a city, a state, or a region (east coast, west coast, midwest, southwest, southeast)")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "e.g. Chicago, Illinois, midwest"}
            },
            "required": ["location"]
        }))
        .category(ToolCategory::Read)
        .build(get_nodes_by_location_handler)
}

async fn get_nodes_by_location_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: LocationParams = parse_args(args)?;
    finish(nodes_by_location(&ctx, params).await)
}

async fn nodes_by_location(ctx: &ToolContext, params: LocationParams) -> ToolOutcome {
    let location = params.location.trim();
    info!("Getting nodes in location: {}", location);
    let nodes = all_nodes(ctx, &format!("Error finding nodes in {}", location)).await?;
    if nodes.is_empty() {
        return Ok("No nodes found in the database.".to_string());
    }

    let matching = nodes_in_location(&nodes, location);
    debug!(
        "Location {:?} matched nodes: {:?}",
        location,
        matching.iter().map(|n| n.vsn.as_str()).collect::<Vec<_>>()
    );
    if matching.is_empty() {
        return Ok(format!("No SAGE nodes found in {}.", location));
    }
    Ok(format::location_matches(location, &matching))
}

// ============================================================================
// get_measurement_stat_by_location
// ============================================================================

fn default_measurement() -> String {
    TEMPERATURE.to_string()
}

fn default_stat() -> String {
    "max".to_string()
}

fn default_sensor() -> String {
    "bme680".to_string()
}

#[derive(Debug, Deserialize)]
struct LocationStatParams {
    location: String,
    #[serde(default = "default_measurement")]
    measurement_type: String,
    #[serde(default = "default_stat")]
    stat: String,
    #[serde(default = "default_time_range_1h")]
    time_range: String,
    #[serde(default = "default_sensor")]
    sensor_type: String,
    #[serde(default)]
    filter_expr: String,
}

fn get_measurement_stat_by_location_tool() -> RegisteredTool {
    ToolBuilder::new("get_measurement_stat_by_location")
        .description("Get a statistic (min, max, avg) of a measurement across the nodes of a location. An optional filter such as 'value > 5' is applied to readings first")
        .input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "City, state or region"},
                "measurement_type": {"type": "string", "default": "env.temperature"},
                "stat": {"type": "string", "enum": ["min", "max", "avg"], "default": "max"},
                "time_range": {"type": "string", "default": "-1h"},
                "sensor_type": {"type": "string", "description": "Sensor filter; empty for any", "default": "bme680"},
                "filter_expr": {"type": "string", "description": "`value <op> number`, op one of > >= < <= == !="}
            },
            "required": ["location"]
        }))
        .category(ToolCategory::Read)
        .build(get_measurement_stat_by_location_handler)
}

async fn get_measurement_stat_by_location_handler(ctx: ToolContext, args: Value) -> ToolResult {
    let params: LocationStatParams = parse_args(args)?;
    finish(measurement_stat_by_location(&ctx, params).await)
}

async fn location_readings(
    ctx: &ToolContext,
    params: &LocationStatParams,
    window: &crate::data::TimeWindow,
    vsns: &[String],
) -> Result<Vec<Record>, ToolFailure> {
    let context = format!(
        "Error getting {} of {} for {}",
        params.stat, params.measurement_type, params.location
    );
    let query = |filter: QueryFilter| {
        let context = context.clone();
        async move {
            ctx.services
                .data
                .query(ctx.credentials.as_ref(), window, &filter)
                .await
                .map_err(|e| ToolFailure::upstream(&context, &e))
        }
    };

    let measurement = params.measurement_type.as_str();
    if is_rain_gauge(measurement) {
        // Rain gauge readings are published by the rain gauge plugin without a
        // sensor tag; look them up by plugin first.
        let by_plugin = query(QueryFilter::new().plugin(RAINGAUGE_PLUGIN_PATTERN).nodes(vsns)).await?;
        if !by_plugin.is_empty() {
            return Ok(by_plugin
                .into_iter()
                .filter(|r| r.name == measurement)
                .collect());
        }
        return query(QueryFilter::new().name(measurement).nodes(vsns)).await;
    }

    let mut filter = QueryFilter::new().name(measurement).nodes(vsns);
    if !params.sensor_type.trim().is_empty() {
        filter = filter.sensor(params.sensor_type.trim());
    }
    query(filter).await
}

async fn measurement_stat_by_location(ctx: &ToolContext, params: LocationStatParams) -> ToolOutcome {
    let stat = StatKind::parse(&params.stat).ok_or_else(|| {
        ToolFailure(format!(
            "Error: Unknown stat '{}'. Use 'min', 'max', or 'avg'.",
            params.stat
        ))
    })?;
    let value_filter =
        ValueFilter::parse(&params.filter_expr).map_err(|e| ToolFailure(format!("Error: {}", e)))?;
    let window = window(&params.time_range)?;
    let location = params.location.trim();
    info!(
        "Getting {} of {} for location: {}",
        params.stat, params.measurement_type, location
    );

    let nodes = all_nodes(ctx, &format!("Error finding nodes in {}", location)).await?;
    let matching = nodes_in_location(&nodes, location);
    if matching.is_empty() {
        return Ok(format!("No SAGE nodes found in {}.", location));
    }
    if matching.len() > MAX_STAT_NODES {
        info!(
            "Limiting query from {} to {} nodes",
            matching.len(),
            MAX_STAT_NODES
        );
    }
    let vsns: Vec<String> = matching
        .iter()
        .take(MAX_STAT_NODES)
        .map(|n| n.vsn.clone())
        .collect();

    let readings = location_readings(ctx, &params, &window, &vsns).await?;
    if readings.is_empty() {
        return Ok(format!(
            "No {} data found for nodes in {} during the last {}",
            params.measurement_type, location, window
        ));
    }

    let readings: Vec<(&Record, f64)> = readings
        .iter()
        .filter_map(|r| r.value.coerce_f64().map(|v| (r, v)))
        .filter(|(_, v)| value_filter.map_or(true, |f| f.accepts(*v)))
        .collect();
    if readings.is_empty() {
        return Ok(format!(
            "No {} data matched the filter '{}' for nodes in {} during the last {}",
            params.measurement_type,
            params.filter_expr.trim(),
            location,
            window
        ));
    }

    let meta = rain_gauge_meta(&params.measurement_type);
    let unit = meta.map(|(unit, _)| format!(" {}", unit)).unwrap_or_default();
    let filter_note = value_filter
        .map(|f| format!(", filter: '{}'", f))
        .unwrap_or_default();
    let scope = format!(
        "{} in {} (last {}{})",
        params.measurement_type, location, window, filter_note
    );

    let mut out = match stat {
        StatKind::Min | StatKind::Max => {
            let pick = readings.iter().copied().reduce(|best, candidate| {
                let better = match stat {
                    StatKind::Min => candidate.1 < best.1,
                    _ => candidate.1 > best.1,
                };
                if better {
                    candidate
                } else {
                    best
                }
            });
            let Some((record, value)) = pick else {
                return Ok(format!("No {} data found in {}", params.measurement_type, location));
            };
            let (title, icon) = match stat {
                StatKind::Min => ("Minimum", "❄️"),
                _ => ("Maximum", "🔥"),
            };
            format!(
                "{} {}:\n\n{} {:.2}{} measured at node {}\n  Time: {}\n  Data from {} readings\n",
                title,
                scope,
                icon,
                value,
                unit,
                record.vsn().unwrap_or("unknown"),
                format_display(&record.timestamp),
                readings.len()
            )
        }
        StatKind::Avg => {
            let mean = readings.iter().map(|(_, v)| v).sum::<f64>() / readings.len() as f64;
            format!(
                "Average {}:\n\n📊 {:.2}{} (from {} readings)\n",
                scope,
                mean,
                unit,
                readings.len()
            )
        }
    };
    if let Some((_, description)) = meta {
        let _ = writeln!(out, "Description: {}", description);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{text_of, FakeManifests, Fixture};
    use super::*;
    use crate::catalog::SensorHardware;
    use crate::data::record::test_support::record;
    use serde_json::json;
    use std::sync::Arc;

    fn node(vsn: &str, address: &str) -> NodeManifest {
        NodeManifest {
            vsn: vsn.to_string(),
            name: format!("node-{}", vsn.to_lowercase()),
            phase: "Deployed".to_string(),
            address: address.to_string(),
            ..Default::default()
        }
    }

    fn chicago_fixture(records: Vec<Record>) -> Fixture {
        let mut fixture = Fixture::new().with_records(records);
        fixture.manifests = Arc::new(FakeManifests {
            nodes: vec![
                node("W023", "Lemont, IL"),
                node("W07A", "Chicago, IL"),
                node("W0B1", "Tucson, AZ"),
            ],
            sensors: vec![SensorHardware {
                hardware: "bme680".to_string(),
                hw_model: "BME680".to_string(),
                manufacturer: "Bosch".to_string(),
                capabilities: vec!["temperature".to_string()],
                vsns: vec!["W023".to_string()],
                ..Default::default()
            }],
        });
        fixture
    }

    #[tokio::test]
    async fn test_node_info_rejects_bad_id_and_reports_upstream() {
        let fixture = Fixture::new();
        let (text, is_error) =
            text_of(get_node_info_handler(fixture.context(), json!({"node_id": "W0/../x"})).await);
        assert!(is_error);
        assert!(text.starts_with("Invalid node"));

        let (text, is_error) =
            text_of(get_node_info_handler(fixture.context(), json!({"node_id": "23"})).await);
        assert!(is_error);
        assert!(text.starts_with("Error getting detailed information for node W23: manifests returned HTTP 404"));
    }

    #[tokio::test]
    async fn test_sensor_details() {
        let fixture = chicago_fixture(vec![]);
        let (text, _) = text_of(
            get_sensor_details_handler(fixture.context(), json!({"sensor_type": "temp"})).await,
        );
        assert!(text.starts_with("Sensor Information for 'temp' (Found 1 matches):"));

        let (text, _) = text_of(
            get_sensor_details_handler(fixture.context(), json!({"sensor_type": "lidar"})).await,
        );
        assert!(text.starts_with("No sensors found matching 'lidar'"));
    }

    #[tokio::test]
    async fn test_nodes_by_location_region() {
        let fixture = chicago_fixture(vec![]);
        let (text, _) = text_of(
            get_nodes_by_location_handler(fixture.context(), json!({"location": "midwest"})).await,
        );
        assert!(text.starts_with("Found 2 nodes in or near midwest:"));
        assert!(text.contains("- Node W023"));
        assert!(!text.contains("W0B1"));

        let (text, _) = text_of(
            get_nodes_by_location_handler(fixture.context(), json!({"location": "Boston"})).await,
        );
        assert_eq!(text, "No SAGE nodes found in Boston.");
    }

    #[tokio::test]
    async fn test_stat_by_location_max_and_avg() {
        let records = vec![
            record(1, TEMPERATURE, 21.0, &[("vsn", "W023"), ("sensor", "bme680")]),
            record(2, TEMPERATURE, 25.5, &[("vsn", "W07A"), ("sensor", "bme680")]),
            record(3, TEMPERATURE, 40.0, &[("vsn", "W0B1"), ("sensor", "bme680")]),
        ];
        let fixture = chicago_fixture(records);
        let (text, is_error) = text_of(
            get_measurement_stat_by_location_handler(
                fixture.context(),
                json!({"location": "Illinois"}),
            )
            .await,
        );
        // "Illinois" is a plain substring search and the addresses say "IL".
        assert!(!is_error);
        assert_eq!(text, "No SAGE nodes found in Illinois.");

        let (text, _) = text_of(
            get_measurement_stat_by_location_handler(
                fixture.context(),
                json!({"location": "IL", "stat": "max"}),
            )
            .await,
        );
        assert!(text.starts_with("Maximum env.temperature in IL (last -1h):"));
        assert!(text.contains("🔥 25.50 measured at node W07A"));
        assert!(text.contains("Data from 2 readings"));

        let (text, _) = text_of(
            get_measurement_stat_by_location_handler(
                fixture.context(),
                json!({"location": "midwest", "stat": "avg", "filter_expr": "value < 25"}),
            )
            .await,
        );
        assert!(text.starts_with("Average env.temperature in midwest (last -1h, filter: 'value < 25'):"));
        assert!(text.contains("📊 21.00 (from 1 readings)"));
    }

    #[tokio::test]
    async fn test_stat_by_location_rain_gauge_units() {
        let records = vec![
            record(1, "env.raingauge.rint", 1.5, &[("vsn", "W023"), ("plugin", "waggle/plugin-raingauge:0.4")]),
            record(2, "env.raingauge.total_acc", 9.0, &[("vsn", "W023"), ("plugin", "waggle/plugin-raingauge:0.4")]),
        ];
        let fixture = chicago_fixture(records);
        let (text, _) = text_of(
            get_measurement_stat_by_location_handler(
                fixture.context(),
                json!({"location": "Lemont", "measurement_type": "env.raingauge.rint", "stat": "min"}),
            )
            .await,
        );
        assert!(text.contains("❄️ 1.50 mm/hr measured at node W023"));
        assert!(text.contains("Description: Hydreon RG-15 rain gauge rain intensity"));
    }

    #[tokio::test]
    async fn test_stat_by_location_bad_inputs() {
        let fixture = chicago_fixture(vec![]);
        let (text, is_error) = text_of(
            get_measurement_stat_by_location_handler(
                fixture.context(),
                json!({"location": "IL", "stat": "median"}),
            )
            .await,
        );
        assert!(is_error);
        assert_eq!(text, "Error: Unknown stat 'median'. Use 'min', 'max', or 'avg'.");

        let (text, is_error) = text_of(
            get_measurement_stat_by_location_handler(
                fixture.context(),
                json!({"location": "IL", "filter_expr": "import os"}),
            )
            .await,
        );
        assert!(is_error);
        assert!(text.starts_with("Error: Invalid filter expression 'import os'"));
    }
}
