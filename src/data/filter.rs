//! Data API filters and the pattern helpers used to build them.

use serde::Serialize;
use std::collections::BTreeMap;

use super::node::{is_all_nodes, normalize_node_id};

pub const TEMPERATURE: &str = "env.temperature";
pub const HUMIDITY: &str = "env.relative_humidity";
pub const PRESSURE: &str = "env.pressure";

pub const ENVIRONMENTAL_NAMES: [&str; 3] = [TEMPERATURE, HUMIDITY, PRESSURE];
pub const IIO_NAMES: [&str; 4] = [
    "iio.in_temp_input",
    "iio.in_humidityrelative_input",
    "iio.in_pressure_input",
    "iio.in_resistance_input",
];

pub const CLOUD_PLUGIN_PATTERN: &str = ".*cloud-cover.*|.*cloud-motion.*|.*imagesampler.*";
pub const RAINGAUGE_PLUGIN_PATTERN: &str = ".*plugin-raingauge.*";

/// Filter sent to the data API. Keys are kept sorted so request bodies are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryFilter(BTreeMap<String, String>);

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, pattern: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), pattern.into());
        self
    }

    pub fn name(self, pattern: impl Into<String>) -> Self {
        self.with("name", pattern)
    }

    pub fn plugin(self, pattern: impl Into<String>) -> Self {
        self.with("plugin", pattern)
    }

    pub fn sensor(self, pattern: impl Into<String>) -> Self {
        self.with("sensor", pattern)
    }

    /// Restricts to one node; ids meaning "all nodes" leave the default.
    pub fn node(self, raw_id: &str) -> Self {
        let id = normalize_node_id(raw_id);
        if is_all_nodes(&id) {
            self
        } else {
            self.with("vsn", id)
        }
    }

    /// Restricts to a set of nodes with an alternation pattern.
    pub fn nodes(self, ids: &[String]) -> Self {
        match ids {
            [] => self,
            [one] => self.node(one),
            many => self.with(
                "vsn",
                many.iter()
                    .map(|id| normalize_node_id(id))
                    .collect::<Vec<_>>()
                    .join("|"),
            ),
        }
    }

    /// The filter as sent on the wire: `vsn` defaults to `*`.
    pub fn to_wire(&self) -> BTreeMap<String, String> {
        let mut wire = self.0.clone();
        wire.entry("vsn".to_string()).or_insert_with(|| "*".to_string());
        wire
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Wraps each `|`-separated part with `.*` on both sides when missing.
pub fn wildcard(pattern: &str) -> String {
    pattern
        .split('|')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut part = p.to_string();
            if !part.starts_with(".*") {
                part.insert_str(0, ".*");
            }
            if !part.ends_with(".*") {
                part.push_str(".*");
            }
            part
        })
        .collect::<Vec<_>>()
        .join("|")
}

pub fn alternation(names: &[&str]) -> String {
    names.join("|")
}

const JOB_KEYWORD_PATTERNS: &[(&str, &[&str])] = &[
    ("audio", &[".*audio.*", ".*sage-audio.*"]),
    ("air-quality", &[".*air-quality.*", ".*airquality.*"]),
    ("cloud", &[".*cloud.*"]),
    ("image", &[".*image.*", ".*sampler.*"]),
    ("camera", &[".*camera.*", ".*imagesampler.*"]),
    ("sound", &[".*sound.*", ".*audio.*"]),
    ("weather", &[".*weather.*", ".*wxt.*"]),
    ("rain", &[".*rain.*", ".*raingauge.*"]),
    ("temperature", &[".*temperature.*", ".*temp.*"]),
    ("motion", &[".*motion.*"]),
    ("ptz", &[".*ptz.*"]),
    ("yolo", &[".*yolo.*"]),
    ("bird", &[".*bird.*", ".*avian.*"]),
    ("mobotix", &[".*mobotix.*"]),
];

/// Builds the plugin pattern for a job name: the name itself plus the
/// patterns of every job-type keyword it contains, without duplicates.
pub fn job_keyword_pattern(job_name: &str) -> String {
    let job_name = job_name.trim();
    let mut patterns: Vec<String> = Vec::new();
    if !job_name.starts_with(".*") && !job_name.contains('|') {
        patterns.push(wildcard(job_name));
    }

    let lower = job_name.to_lowercase();
    for (keyword, keyword_patterns) in JOB_KEYWORD_PATTERNS {
        if lower.contains(keyword) {
            for pattern in keyword_patterns.iter() {
                if !patterns.iter().any(|p| p == pattern) {
                    patterns.push(pattern.to_string());
                }
            }
        }
    }

    if patterns.is_empty() {
        wildcard(job_name)
    } else {
        patterns.join("|")
    }
}

/// A looser pattern tried when the mapped one found nothing: any of the
/// meaningful words of the job name.
pub fn broader_job_pattern(job_name: &str) -> Option<String> {
    let words: Vec<String> = job_name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(wildcard(&words.join("|")))
    }
}
