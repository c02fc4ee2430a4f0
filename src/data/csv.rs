//! CSV rendering of query results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use super::record::{Record, Stats};
use super::time_range::format_wire;

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let row = fields
        .into_iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&row);
    out.push('\n');
}

/// Records as CSV: `timestamp,name,value,meta.<k>...`, meta columns being the
/// sorted union of all meta keys.
pub fn to_csv(records: &[Record]) -> String {
    let meta_keys: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.meta.keys().map(String::as_str))
        .collect();

    let mut out = String::new();
    let header = ["timestamp", "name", "value"]
        .into_iter()
        .map(str::to_string)
        .chain(meta_keys.iter().map(|k| format!("meta.{}", k)));
    write_row(&mut out, header);

    for record in records {
        let fields = [
            format_wire(&record.timestamp),
            record.name.clone(),
            record.value.to_string(),
        ]
        .into_iter()
        .chain(
            meta_keys
                .iter()
                .map(|k| record.meta(k).unwrap_or_default().to_string()),
        );
        write_row(&mut out, fields);
    }
    out
}

/// A group key rendered as one or more leading CSV columns.
pub trait GroupColumns {
    fn columns(&self) -> Vec<String>;
}

impl GroupColumns for &str {
    fn columns(&self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl GroupColumns for String {
    fn columns(&self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<A: Display, B: Display> GroupColumns for (A, B) {
    fn columns(&self) -> Vec<String> {
        vec![self.0.to_string(), self.1.to_string()]
    }
}

/// Grouped statistics as CSV: the key columns then `size,min,max,mean`.
pub fn stats_csv<K: GroupColumns>(key_headers: &[&str], groups: &BTreeMap<K, Stats>) -> String {
    let mut out = String::new();
    write_row(
        &mut out,
        key_headers
            .iter()
            .copied()
            .chain(["size", "min", "max", "mean"]),
    );
    for (key, stats) in groups {
        let mut row = key.columns();
        row.extend([
            stats.count.to_string(),
            format!("{:.3}", stats.min),
            format!("{:.3}", stats.max),
            format!("{:.3}", stats.mean),
        ]);
        write_row(&mut out, row);
    }
    out
}
