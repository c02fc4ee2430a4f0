use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all server metrics
const PREFIX: &str = "sage_mcp";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // MCP Metrics
    pub static ref MCP_TOOL_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_tool_calls_total"), "Total MCP tool calls by outcome"),
        &["tool", "outcome"]
    ).expect("Failed to create tool_calls_total metric");

    pub static ref MCP_ACTIVE_SESSIONS: IntGauge = IntGauge::new(
        format!("{PREFIX}_active_sessions"),
        "Number of open MCP sessions"
    ).expect("Failed to create active_sessions metric");

    // Rate Limiting Metrics
    pub static ref RATE_LIMIT_HITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rate_limit_hits_total"), "Rate limit violations"),
        &["category"]
    ).expect("Failed to create rate_limit_hits_total metric");

    // Upstream Metrics
    pub static ref UPSTREAM_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_upstream_request_duration_seconds"),
            "Duration of requests to platform services in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["service", "status"]
    ).expect("Failed to create upstream_request_duration_seconds metric");

    // Image Proxy Metrics
    pub static ref IMAGE_CACHE_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_image_cache_events_total"), "Image proxy cache hits and misses"),
        &["event"]
    ).expect("Failed to create image_cache_events_total metric");

    // Process Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(MCP_TOOL_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MCP_ACTIVE_SESSIONS.clone()));
    let _ = REGISTRY.register(Box::new(RATE_LIMIT_HITS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(UPSTREAM_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(IMAGE_CACHE_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Collapses dynamic path segments so label cardinality stays bounded
pub fn categorize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/mcp" => "/mcp",
        "/mcp/tools" => "/mcp/tools",
        p if p.starts_with("/mcp/resources/") => "/mcp/resources/{uri}",
        p if p.starts_with("/proxy/image") => "/proxy/image",
        "/metrics" => "/metrics",
        _ => "other",
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record the outcome of a tool call: "ok", "tool_error" or "failed"
pub fn record_tool_call(tool: &str, outcome: &str) {
    MCP_TOOL_CALLS_TOTAL
        .with_label_values(&[tool, outcome])
        .inc();
}

pub fn set_active_sessions(count: usize) {
    MCP_ACTIVE_SESSIONS.set(count as i64);
}

/// Record a rate limit hit
pub fn record_rate_limit_hit(category: &str) {
    RATE_LIMIT_HITS_TOTAL.with_label_values(&[category]).inc();
}

/// Record a request to a platform service. `status` is the HTTP status or
/// "error" when no response arrived.
pub fn record_upstream_request(service: &str, status: &str, duration: Duration) {
    UPSTREAM_REQUEST_DURATION_SECONDS
        .with_label_values(&[service, status])
        .observe(duration.as_secs_f64());
}

pub fn record_image_cache_event(event: &str) {
    IMAGE_CACHE_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<f64>().ok());
            if let Some(kb) = rss_kb {
                PROCESS_MEMORY_BYTES.set(kb * 1024.0);
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_family(name: &str) -> bool {
        REGISTRY.gather().iter().any(|m| m.get_name() == name)
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();
        init_metrics();
        assert!(!REGISTRY.gather().is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_http_request() {
        init_metrics();
        record_http_request("POST", "/mcp", 200, Duration::from_millis(50));
        assert!(has_family("sage_mcp_http_requests_total"));
    }

    #[test]
    fn test_record_tool_call_and_upstream() {
        init_metrics();
        record_tool_call("get_node_info", "ok");
        record_upstream_request("data", "200", Duration::from_millis(120));
        assert!(has_family("sage_mcp_tool_calls_total"));
        assert!(has_family("sage_mcp_upstream_request_duration_seconds"));
    }

    #[test]
    fn test_record_image_cache_event() {
        init_metrics();
        record_image_cache_event("hit");
        assert!(has_family("sage_mcp_image_cache_events_total"));
    }

    #[test]
    fn test_categorize_endpoint() {
        assert_eq!(categorize_endpoint("/mcp"), "/mcp");
        assert_eq!(
            categorize_endpoint("/mcp/resources/query%3A%2F%2Fx"),
            "/mcp/resources/{uri}"
        );
        assert_eq!(categorize_endpoint("/proxy/image"), "/proxy/image");
        assert_eq!(categorize_endpoint("/random"), "other");
    }
}
