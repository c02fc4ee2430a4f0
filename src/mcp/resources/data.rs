//! Data Resources
//!
//! Recent sensor data as CSV.

use tracing::{info, warn};

use crate::data::csv::{stats_csv, to_csv};
use crate::data::filter::TEMPERATURE;
use crate::data::record::group_stats;
use crate::data::{wildcard, QueryFilter, TimeWindow};
use crate::mcp::context::ToolContext;
use crate::mcp::protocol::{McpError, ResourceContent};
use crate::mcp::registry::{
    McpRegistry, RegisteredResource, ResourceBuilder, ResourceRequest, ResourceResult,
};

const CSV_MIME: &str = "text/csv";
const PLUGIN_WINDOW: &str = "-30m";
const STATS_WINDOW: &str = "-1h";
const STATIC_PLUGIN: &str = "plugin-iio";

/// Register data resources with the registry
pub fn register_resources(registry: &mut McpRegistry) {
    // The concrete URI goes first so it wins over the template.
    registry.register_resource(plugin_iio_resource());
    registry.register_resource(plugin_query_resource());
    registry.register_resource(temperature_stats_resource());
}

fn window(raw: &str) -> Result<TimeWindow, McpError> {
    TimeWindow::parse(raw).map_err(|e| McpError::InternalError(e.to_string()))
}

/// Plugin data of the last 30 minutes as CSV. Upstream failures are
/// returned as the resource text.
async fn plugin_csv(ctx: &ToolContext, uri: String, plugin: &str) -> ResourceResult {
    info!("Querying plugin data for: {}", plugin);
    let filter = QueryFilter::new().plugin(wildcard(plugin));
    let text = match ctx
        .services
        .data
        .query(ctx.credentials.as_ref(), &window(PLUGIN_WINDOW)?, &filter)
        .await
    {
        Ok(records) => {
            let csv = to_csv(&records);
            info!("Plugin {} query returned {} characters", plugin, csv.len());
            csv
        }
        Err(e) => {
            warn!("Error querying plugin {}: {}", plugin, e);
            format!("Error querying plugin {}: {}", plugin, e)
        }
    };
    Ok(vec![ResourceContent::text(uri, CSV_MIME, text)])
}

// ============================================================================
// query://plugin-iio
// ============================================================================

fn plugin_iio_resource() -> RegisteredResource {
    ResourceBuilder::new(format!("query://{}", STATIC_PLUGIN), "IIO Plugin Data")
        .description("Readings of the plugin-iio environmental sensors from the last 30 minutes, as CSV")
        .mime_type(CSV_MIME)
        .build(plugin_iio_handler)
}

async fn plugin_iio_handler(ctx: ToolContext, request: ResourceRequest) -> ResourceResult {
    plugin_csv(&ctx, request.uri, STATIC_PLUGIN).await
}

// ============================================================================
// query://{plugin}
// ============================================================================

fn plugin_query_resource() -> RegisteredResource {
    ResourceBuilder::new("query://{plugin}", "Plugin Data")
        .description("All records a plugin published in the last 30 minutes, as CSV")
        .mime_type(CSV_MIME)
        .build(plugin_query_handler)
}

async fn plugin_query_handler(ctx: ToolContext, request: ResourceRequest) -> ResourceResult {
    let plugin = request
        .param("plugin")
        .ok_or_else(|| McpError::InvalidParams(format!("Invalid query URI: {}", request.uri)))?
        .to_string();
    plugin_csv(&ctx, request.uri, &plugin).await
}

// ============================================================================
// stats://temperature
// ============================================================================

fn temperature_stats_resource() -> RegisteredResource {
    ResourceBuilder::new("stats://temperature", "Temperature Statistics")
        .description("Temperature statistics of the last hour grouped by node and sensor")
        .mime_type(CSV_MIME)
        .build(temperature_stats_handler)
}

async fn temperature_stats_handler(ctx: ToolContext, request: ResourceRequest) -> ResourceResult {
    let filter = QueryFilter::new().name(TEMPERATURE);
    let text = match ctx
        .services
        .data
        .query(ctx.credentials.as_ref(), &window(STATS_WINDOW)?, &filter)
        .await
    {
        Ok(records) => {
            let groups = group_stats(&records, |r| {
                Some((r.vsn()?.to_string(), r.sensor()?.to_string()))
            });
            if groups.is_empty() {
                "No temperature data found in the last hour".to_string()
            } else {
                stats_csv(&["meta.vsn", "meta.sensor"], &groups)
            }
        }
        Err(e) => {
            warn!("Error getting temperature stats: {}", e);
            format!("Error getting temperature stats: {}", e)
        }
    };
    Ok(vec![ResourceContent::text(request.uri, CSV_MIME, text)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::record::test_support::record;
    use crate::mcp::tools::test_support::Fixture;

    fn registry() -> McpRegistry {
        let mut registry = McpRegistry::new();
        register_resources(&mut registry);
        registry
    }

    async fn read(fixture: &Fixture, uri: &str) -> String {
        let registry = registry();
        let (resource, request) = registry.find_resource(uri).unwrap();
        let contents = (resource.handler)(fixture.context(), request).await.unwrap();
        contents[0].text.clone()
    }

    #[tokio::test]
    async fn test_plugin_query_csv() {
        let fixture = Fixture::new().with_records(vec![
            record(0, "env.temperature", 21.5, &[("plugin", "waggle/plugin-iio:0.6"), ("vsn", "W023")]),
            record(1, "env.count", 3.0, &[("plugin", "waggle/plugin-yolo:1.0"), ("vsn", "W023")]),
        ]);
        let csv = read(&fixture, "query://plugin-yolo").await;
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.starts_with("timestamp,name,value,meta.plugin,meta.vsn\n"));
        assert!(csv.contains("env.count"));

        let seen = fixture.data.seen.lock().unwrap();
        assert_eq!(seen[0].get("plugin"), Some(".*plugin-yolo.*"));
    }

    #[tokio::test]
    async fn test_static_plugin_iio() {
        let registry = registry();
        let (resource, _) = registry.find_resource("query://plugin-iio").unwrap();
        assert!(!resource.is_template());

        let fixture = Fixture::new().with_records(vec![record(
            0,
            "env.temperature",
            21.5,
            &[("plugin", "waggle/plugin-iio:0.6")],
        )]);
        let csv = read(&fixture, "query://plugin-iio").await;
        assert!(csv.contains("waggle/plugin-iio:0.6"));
    }

    #[tokio::test]
    async fn test_temperature_stats() {
        let fixture = Fixture::new().with_records(vec![
            record(0, "env.temperature", 20.0, &[("vsn", "W023"), ("sensor", "bme680")]),
            record(5, "env.temperature", 22.0, &[("vsn", "W023"), ("sensor", "bme680")]),
            record(5, "env.relative_humidity", 50.0, &[("vsn", "W023"), ("sensor", "bme680")]),
        ]);
        let csv = read(&fixture, "stats://temperature").await;
        assert_eq!(
            csv,
            "meta.vsn,meta.sensor,size,min,max,mean\nW023,bme680,2,20.000,22.000,21.000\n"
        );

        let empty = read(&Fixture::new(), "stats://temperature").await;
        assert_eq!(empty, "No temperature data found in the last hour");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_resource_text() {
        let mut fixture = Fixture::new();
        fixture.data = std::sync::Arc::new(crate::mcp::tools::test_support::FakeData {
            fail: true,
            ..Default::default()
        });
        let text = read(&fixture, "query://plugin-iio").await;
        assert!(text.starts_with("Error querying plugin plugin-iio:"));
    }
}
