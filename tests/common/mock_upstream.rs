//! In-process stand-ins for the SAGE platform services
//!
//! One axum app plays the data API, the node manifests, the plugin
//! registry, the edge scheduler and the file storage, so end-to-end tests
//! never leave localhost.

use super::constants::*;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// What the mock upstream saw, for assertions.
#[derive(Default)]
pub struct UpstreamLog {
    /// `Authorization` header of every data API query ("" when absent)
    pub data_auth: Mutex<Vec<String>>,
    /// Filters of every data API query
    pub data_filters: Mutex<Vec<Value>>,
    /// YAML bodies accepted by the scheduler, with their dry run flag
    pub submitted_jobs: Mutex<Vec<(String, bool)>>,
    /// Number of requests that reached the storage
    pub storage_hits: AtomicUsize,
}

impl UpstreamLog {
    pub fn storage_hits(&self) -> usize {
        self.storage_hits.load(Ordering::SeqCst)
    }
}

pub struct MockUpstream {
    pub base_url: String,
    pub log: Arc<UpstreamLog>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let log = Arc::new(UpstreamLog::default());

        let app = Router::new()
            .route("/api/v1/query", post(data_query))
            .route("/manifests/", get(manifests))
            .route("/api/v-beta/nodes/{vsn}/", get(node_detail))
            .route("/sensors/", get(sensors))
            .route("/api/apps", get(apps))
            .route("/api/meta-files/{*path}", get(meta_file))
            .route("/api/v1/submit", post(submit_job))
            .route("/api/v1/jobs/{id}/status", get(job_status))
            .route("/api/v1/jobs/{id}/rm", get(remove_job))
            .route("/api/v1/data/{*path}", get(storage_file))
            .with_state(log.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock upstream");
        let port = listener
            .local_addr()
            .expect("Failed to get mock upstream address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock upstream failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            log,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn image_url(&self) -> String {
        format!("{}{}", self.base_url, IMAGE_PATH)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// ============================================================================
// Data API
// ============================================================================

fn records() -> Vec<Value> {
    let now = Utc::now();
    let mut records = Vec::new();
    for (minutes_ago, temperature, humidity) in [(20, 21.0, 40.0), (10, 22.0, 42.0), (1, 23.0, 44.0)]
    {
        let timestamp = (now - ChronoDuration::minutes(minutes_ago)).to_rfc3339();
        records.push(json!({
            "timestamp": timestamp,
            "name": "env.temperature",
            "value": temperature,
            "meta": {"vsn": NODE_1_VSN, "sensor": "bme680", "plugin": "registry.sagecontinuum.org/theone/plugin-iio:0.4.5", "node": NODE_1_NAME}
        }));
        records.push(json!({
            "timestamp": timestamp,
            "name": "env.relative_humidity",
            "value": humidity,
            "meta": {"vsn": NODE_1_VSN, "sensor": "bme680", "plugin": "registry.sagecontinuum.org/theone/plugin-iio:0.4.5", "node": NODE_1_NAME}
        }));
    }
    records
}

/// Exact values, `*`, `a|b` alternations and `.*x.*` containment.
fn pattern_matches(pattern: &str, value: &str) -> bool {
    pattern == "*"
        || pattern.split('|').any(|part| {
            if part.starts_with(".*") || part.ends_with(".*") {
                value.contains(part.trim_start_matches(".*").trim_end_matches(".*"))
            } else {
                part == value
            }
        })
}

fn record_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    match key.strip_prefix("meta.") {
        Some(meta_key) => record["meta"][meta_key].as_str(),
        None => record[key].as_str().or_else(|| record["meta"][key].as_str()),
    }
}

async fn data_query(
    State(log): State<Arc<UpstreamLog>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    log.data_auth.lock().unwrap().push(auth);

    let filter = body["filter"].as_object().cloned().unwrap_or_default();
    log.data_filters
        .lock()
        .unwrap()
        .push(Value::Object(filter.clone()));

    let lines: Vec<String> = records()
        .into_iter()
        .filter(|record| {
            filter.iter().all(|(key, pattern)| {
                let pattern = pattern.as_str().unwrap_or("*");
                pattern == "*"
                    || record_field(record, key)
                        .map(|v| pattern_matches(pattern, v))
                        .unwrap_or(false)
            })
        })
        .map(|record| record.to_string())
        .collect();
    (StatusCode::OK, lines.join("\n")).into_response()
}

// ============================================================================
// Node manifests
// ============================================================================

async fn manifests() -> Json<Value> {
    Json(json!([
        {
            "vsn": NODE_1_VSN,
            "name": NODE_1_NAME,
            "phase": "Deployed",
            "address": "Argonne National Laboratory, Lemont, IL",
            "sensors": [{"name": "bme680", "hw_model": "BME680", "capabilities": ["temperature", "humidity"]}]
        },
        {
            "vsn": NODE_2_VSN,
            "name": "000048b02d15bc7d",
            "phase": "Deployed",
            "address": "Chicago, IL"
        },
        {
            "vsn": "W0FF",
            "name": "spare",
            "phase": "Maintenance"
        }
    ]))
}

async fn node_detail(Path(vsn): Path<String>) -> Response {
    if vsn != NODE_1_VSN {
        return (StatusCode::NOT_FOUND, format!("{} not found", vsn)).into_response();
    }
    Json(json!({
        "vsn": NODE_1_VSN,
        "name": NODE_1_NAME,
        "project": "SAGE",
        "type": "WSN",
        "focus": "Urban",
        "phase": "Deployed",
        "location": "Lemont, IL",
        "address": "Argonne National Laboratory, Lemont, IL",
        "gps_lat": 41.7,
        "gps_lon": -87.98,
        "sensors": [{"name": "bme680", "hw_model": "BME680", "manufacturer": "Bosch", "is_active": true}],
        "computes": [{"name": "nxcore", "hw_model": "Xavier NX", "manufacturer": "NVIDIA", "is_active": true}]
    }))
    .into_response()
}

async fn sensors() -> Json<Value> {
    Json(json!([
        {
            "hardware": "bme680",
            "hw_model": "BME680",
            "manufacturer": "Bosch",
            "capabilities": ["temperature", "humidity", "pressure"],
            "vsns": [NODE_1_VSN],
            "description": "Environmental sensor"
        }
    ]))
}

// ============================================================================
// Plugin registry
// ============================================================================

async fn apps() -> Json<Value> {
    Json(json!({
        "data": [
            {
                "id": "theone/plugin-iio:0.4.5",
                "name": "plugin-iio",
                "namespace": "theone",
                "version": "0.4.5",
                "description": "Publishes temperature, humidity and pressure from the BME680",
                "keywords": "temperature,humidity,environment",
                "science_description": "theone/plugin-iio/0.4.5/ecr-meta/ecr-science-description.md"
            }
        ]
    }))
}

async fn meta_file(Path(_path): Path<String>) -> &'static str {
    "# Science\nMeasures the local environment."
}

// ============================================================================
// Scheduler
// ============================================================================

fn scheduler_token_ok(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Sage {}", TEST_TOKEN))
        .unwrap_or(false)
}

fn invalid_token() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        "error: must provide a valid token",
    )
        .into_response()
}

async fn submit_job(
    State(log): State<Arc<UpstreamLog>>,
    headers: HeaderMap,
    axum::extract::RawQuery(query): axum::extract::RawQuery,
    body: Bytes,
) -> Response {
    if !scheduler_token_ok(&headers) {
        return invalid_token();
    }
    let dry_run = query.unwrap_or_default().contains("dryrun=true");
    let yaml = String::from_utf8_lossy(&body).to_string();
    log.submitted_jobs.lock().unwrap().push((yaml, dry_run));
    Json(json!({"job_id": SUBMITTED_JOB_ID, "state": "Created"})).into_response()
}

async fn job_status(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !scheduler_token_ok(&headers) {
        return invalid_token();
    }
    Json(json!({"job_id": id, "state": {"last_state": "Running"}})).into_response()
}

async fn remove_job(headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !scheduler_token_ok(&headers) {
        return invalid_token();
    }
    Json(json!({"job_id": id, "state": "Removed"})).into_response()
}

// ============================================================================
// Storage
// ============================================================================

fn storage_auth_ok(headers: &HeaderMap) -> bool {
    let expected = format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", TEST_USER, TEST_TOKEN))
    );
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false)
}

async fn storage_file(
    State(log): State<Arc<UpstreamLog>>,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Response {
    log.storage_hits.fetch_add(1, Ordering::SeqCst);
    if format!("/api/v1/data/{}", path) != IMAGE_PATH {
        return StatusCode::NOT_FOUND.into_response();
    }
    if !headers.contains_key(header::AUTHORIZATION) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !storage_auth_ok(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    ([(header::CONTENT_TYPE, "image/jpeg")], IMAGE_BYTES).into_response()
}
