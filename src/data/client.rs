//! HTTP client for the time-series data API.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::filter::QueryFilter;
use super::record::Record;
use super::time_range::TimeWindow;
use crate::auth::SageCredentials;
use crate::upstream::{build_http_client, send_text, UpstreamError};

const SERVICE: &str = "data";

/// Source of time-series records.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Runs one query. An empty result is not an error.
    async fn query(
        &self,
        credentials: Option<&SageCredentials>,
        window: &TimeWindow,
        filter: &QueryFilter,
    ) -> Result<Vec<Record>, UpstreamError>;
}

#[derive(Serialize)]
struct QueryBody<'a> {
    start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<String>,
    filter: &'a BTreeMap<String, String>,
}

pub struct HttpDataClient {
    client: reqwest::Client,
    query_url: String,
    max_records: usize,
}

impl HttpDataClient {
    /// Create a new data API client.
    ///
    /// # Arguments
    /// * `query_url` - Full URL of the query endpoint
    /// * `timeout_sec` - Request timeout in seconds
    /// * `max_records` - Records kept per query (most recent first)
    pub fn new(query_url: String, timeout_sec: u64, max_records: usize) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout_sec)?,
            query_url: query_url.trim_end_matches('/').to_string(),
            max_records,
        })
    }
}

/// Parses newline delimited JSON records, skipping lines that don't parse.
pub fn parse_ndjson(body: &str) -> Vec<Record> {
    let mut skipped = 0usize;
    let records: Vec<Record> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Record>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                skipped += 1;
                debug!("Skipping malformed record: {}", e);
                None
            }
        })
        .collect();
    if skipped > 0 {
        warn!("Skipped {} malformed records in data API response", skipped);
    }
    records
}

/// Keeps the `max` most recent records, in time order.
fn cap_records(mut records: Vec<Record>, max: usize) -> Vec<Record> {
    records.sort_by_key(|r| r.timestamp);
    if records.len() > max {
        let excess = records.len() - max;
        debug!("Dropping {} oldest records over the per-query cap", excess);
        records.drain(..excess);
    }
    records
}

#[async_trait]
impl DataSource for HttpDataClient {
    async fn query(
        &self,
        credentials: Option<&SageCredentials>,
        window: &TimeWindow,
        filter: &QueryFilter,
    ) -> Result<Vec<Record>, UpstreamError> {
        let wire_filter = filter.to_wire();
        let body = QueryBody {
            start: window.start_param(),
            end: window.end_param(),
            filter: &wire_filter,
        };
        debug!(
            "Data query start={} end={:?} filter={:?}",
            body.start, body.end, wire_filter
        );

        let mut request = self.client.post(&self.query_url).json(&body);
        match credentials {
            Some(creds) => match creds.basic_auth() {
                Some((user, token)) => request = request.basic_auth(user, Some(token)),
                None => debug!("Credentials without username, querying public data only"),
            },
            None => debug!("Anonymous data query"),
        }

        let text = send_text(SERVICE, request).await?;
        Ok(cap_records(parse_ndjson(&text), self.max_records))
    }
}
