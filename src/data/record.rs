//! Time-series records as returned by the data API, plus the small set of
//! table operations the tools need (stats, grouping, latest rows).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RecordValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RecordValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value, also accepting numeric strings.
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            RecordValue::Number(n) => Some(*n),
            RecordValue::Text(s) => s.trim().parse().ok(),
            RecordValue::Other(_) => None,
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Number(n) => write!(f, "{}", n),
            RecordValue::Text(s) => write!(f, "{}", s),
            RecordValue::Other(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: RecordValue,
    #[serde(default, deserialize_with = "meta_as_text")]
    pub meta: BTreeMap<String, String>,
}

/// Meta values are usually strings, but numbers and booleans show up too.
fn meta_as_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

impl Record {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn vsn(&self) -> Option<&str> {
        self.meta("vsn")
    }

    pub fn sensor(&self) -> Option<&str> {
        self.meta("sensor")
    }

    pub fn plugin(&self) -> Option<&str> {
        self.meta("plugin")
    }

    pub fn task(&self) -> Option<&str> {
        self.meta("task")
    }

    /// Looks up `name`, `value` or `meta.<key>` style fields as text.
    pub fn field(&self, field: &str) -> Option<String> {
        match field {
            "name" => Some(self.name.clone()),
            "value" => Some(self.value.to_string()),
            "timestamp" => Some(super::time_range::format_wire(&self.timestamp)),
            other => self
                .meta(other.strip_prefix("meta.").unwrap_or(other))
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Stats {
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut count = 0usize;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        (count > 0).then(|| Self {
            count,
            min,
            max,
            mean: sum / count as f64,
        })
    }
}

/// Stats over the numeric values of `records`.
pub fn stats(records: &[Record]) -> Option<Stats> {
    Stats::from_values(records.iter().filter_map(|r| r.value.as_f64()))
}

/// Same as [`stats`] but accepting numeric strings.
pub fn coerced_stats(records: &[Record]) -> Option<Stats> {
    Stats::from_values(records.iter().filter_map(|r| r.value.coerce_f64()))
}

/// Groups records by a key; records without a key are dropped.
pub fn group_by<'a, K, F>(records: &'a [Record], key: F) -> BTreeMap<K, Vec<&'a Record>>
where
    K: Ord,
    F: Fn(&'a Record) -> Option<K>,
{
    let mut groups: BTreeMap<K, Vec<&Record>> = BTreeMap::new();
    for record in records {
        if let Some(k) = key(record) {
            groups.entry(k).or_default().push(record);
        }
    }
    groups
}

/// Numeric stats per group.
pub fn group_stats<'a, K, F>(records: &'a [Record], key: F) -> BTreeMap<K, Stats>
where
    K: Ord,
    F: Fn(&'a Record) -> Option<K>,
{
    group_by(records, key)
        .into_iter()
        .filter_map(|(k, rows)| {
            Stats::from_values(rows.iter().filter_map(|r| r.value.as_f64())).map(|s| (k, s))
        })
        .collect()
}

/// Sorted distinct values of a field.
pub fn unique(records: &[Record], field: &str) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.field(field))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// The `n` most recent records, newest first.
pub fn latest(records: &[Record], n: usize) -> Vec<&Record> {
    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted.truncate(n);
    sorted
}

/// The most recent record, if any.
pub fn newest(records: &[Record]) -> Option<&Record> {
    records.iter().max_by_key(|r| r.timestamp)
}

pub fn time_bounds(records: &[Record]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = records.iter().map(|r| r.timestamp).min()?;
    let last = records.iter().map(|r| r.timestamp).max()?;
    Some((first, last))
}


#[cfg(test)]
mod tests {
    use super::test_support::record;
    use super::*;

    #[test]
    fn test_deserialize_ndjson_line() {
        let line = r#"{"timestamp":"2024-05-01T10:00:00.123456789Z","name":"env.temperature","value":21.5,"meta":{"vsn":"W023","sensor":"bme680"}}"#;
        let r: Record = serde_json::from_str(line).unwrap();
        assert_eq!(r.name, "env.temperature");
        assert_eq!(r.value.as_f64(), Some(21.5));
        assert_eq!(r.vsn(), Some("W023"));
        assert_eq!(r.sensor(), Some("bme680"));
        assert!(r.plugin().is_none());
    }

    #[test]
    fn test_deserialize_non_string_meta() {
        let r: Record = serde_json::from_str(
            r#"{"timestamp":"2024-05-01T10:00:00Z","name":"env.temperature","value":21.5,
                "meta":{"vsn":"W023","zone":3,"calibrated":true,"note":null}}"#,
        )
        .unwrap();
        assert_eq!(r.vsn(), Some("W023"));
        assert_eq!(r.meta("zone"), Some("3"));
        assert_eq!(r.meta("calibrated"), Some("true"));
        assert_eq!(r.meta("note"), None);
        assert_eq!(r.field("meta.zone").as_deref(), Some("3"));

        let r: Record = serde_json::from_str(
            r#"{"timestamp":"2024-05-01T10:00:00Z","name":"x","value":1,"meta":null}"#,
        )
        .unwrap();
        assert!(r.meta.is_empty());
    }

    #[test]
    fn test_deserialize_text_and_other_values() {
        let r: Record = serde_json::from_str(
            r#"{"timestamp":"2024-05-01T10:00:00Z","name":"upload","value":"https://storage/x.jpg"}"#,
        )
        .unwrap();
        assert_eq!(r.value, RecordValue::Text("https://storage/x.jpg".to_string()));
        assert!(r.meta.is_empty());

        let r: Record = serde_json::from_str(
            r#"{"timestamp":"2024-05-01T10:00:00Z","name":"flag","value":true,"meta":{}}"#,
        )
        .unwrap();
        assert!(matches!(r.value, RecordValue::Other(_)));
        assert_eq!(r.value.to_string(), "true");
    }

    #[test]
    fn test_stats_ignores_non_numeric() {
        let mut records = vec![
            record(0, "t", 10.0, &[]),
            record(1, "t", 20.0, &[]),
            record(2, "t", 30.0, &[]),
        ];
        records[2].value = RecordValue::Text("n/a".to_string());
        let s = stats(&records).unwrap();
        assert_eq!(s.count, 2);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 20.0);
        assert_eq!(s.mean, 15.0);

        records[2].value = RecordValue::Text("40".to_string());
        assert_eq!(coerced_stats(&records).unwrap().max, 40.0);
        assert!(stats(&[]).is_none());
    }

    #[test]
    fn test_group_stats_by_vsn() {
        let records = vec![
            record(0, "t", 10.0, &[("vsn", "W023")]),
            record(1, "t", 14.0, &[("vsn", "W023")]),
            record(2, "t", 3.0, &[("vsn", "W097")]),
            record(3, "t", 99.0, &[]),
        ];
        let groups = group_stats(&records, |r| r.vsn().map(str::to_string));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["W023"].mean, 12.0);
        assert_eq!(groups["W097"].count, 1);
    }

    #[test]
    fn test_unique_latest_and_bounds() {
        let records = vec![
            record(5, "b", 1.0, &[("vsn", "W2")]),
            record(1, "a", 2.0, &[("vsn", "W1")]),
            record(9, "a", 3.0, &[("vsn", "W2")]),
        ];
        assert_eq!(unique(&records, "name"), vec!["a", "b"]);
        assert_eq!(unique(&records, "meta.vsn"), vec!["W1", "W2"]);

        let top = latest(&records, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].value.as_f64(), Some(3.0));
        assert_eq!(newest(&records).unwrap().value.as_f64(), Some(3.0));

        let (first, last) = time_bounds(&records).unwrap();
        assert!(first < last);
    }
}
