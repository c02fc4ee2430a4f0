//! Location matching for node manifests and the small value filter used by
//! location statistics.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use thiserror::Error;

use super::models::NodeManifest;

/// Most nodes queried by one location statistic.
pub const MAX_STAT_NODES: usize = 20;

const EAST_COAST: &[&str] = &[
    "new york", "massachusetts", "rhode island", "connecticut", "new jersey", "delaware",
    "maryland", "virginia", "north carolina", "south carolina", "georgia", "florida",
    "pennsylvania", "district of columbia", "maine", "new hampshire", "vermont",
    "ny", "ma", "ri", "ct", "nj", "de", "md", "va", "nc", "sc", "ga", "fl", "pa", "dc", "me",
    "nh", "vt", "eastern",
];
const WEST_COAST: &[&str] = &["california", "oregon", "washington", "ca", "or", "wa", "western"];
const MIDWEST: &[&str] = &[
    "illinois", "indiana", "michigan", "ohio", "wisconsin", "minnesota", "iowa", "missouri",
    "kansas", "nebraska", "south dakota", "north dakota", "il", "in", "mi", "oh", "wi", "mn",
    "ia", "mo", "ks", "ne", "sd", "nd", "chicago",
];
const SOUTHWEST: &[&str] = &[
    "arizona", "new mexico", "texas", "oklahoma", "nevada", "az", "nm", "tx", "ok", "nv",
];
const SOUTHEAST: &[&str] = &[
    "alabama", "mississippi", "louisiana", "tennessee", "kentucky", "al", "ms", "la", "tn", "ky",
];

/// State names and abbreviations making up a named region.
pub fn region_terms(location: &str) -> Option<&'static [&'static str]> {
    match location.trim().to_lowercase().as_str() {
        "east coast" => Some(EAST_COAST),
        "west coast" => Some(WEST_COAST),
        "midwest" => Some(MIDWEST),
        "southwest" => Some(SOUTHWEST),
        "southeast" => Some(SOUTHEAST),
        _ => None,
    }
}

/// Spellings of the capital, rewritten so "washington" alone means the state.
const DC_SPELLINGS: &[&str] = &[
    "washington, d.c.",
    "washington d.c.",
    "washington, dc",
    "washington dc",
];

fn normalize_place(text: &str) -> String {
    let mut text = text.to_lowercase();
    for spelling in DC_SPELLINGS {
        text = text.replace(spelling, "district of columbia");
    }
    text
}

/// Whether `abbreviation` is the state code of an address: the first word
/// after a comma, as in "Lemont, IL 60439".
fn has_state_code(text: &str, abbreviation: &str) -> bool {
    text.split(',').skip(1).any(|part| {
        part.split(|c: char| !c.is_ascii_alphanumeric())
            .find(|w| !w.is_empty())
            .is_some_and(|w| w == abbreviation)
    })
}

fn term_matches(text: &str, term: &str) -> bool {
    // Two letter codes collide with ordinary words ("in", "or", "me").
    if term.len() <= 2 {
        has_state_code(text, term)
    } else {
        text.contains(term)
    }
}

/// Whether a node is in `location`: a region name, or any text found in
/// the node's address or location.
pub fn node_in_location(node: &NodeManifest, location: &str) -> bool {
    let location = location.trim().to_lowercase();

    match region_terms(&location) {
        Some(terms) => {
            let address = normalize_place(&node.address);
            let place = normalize_place(&node.location);
            let name = normalize_place(&node.name);
            terms.iter().any(|term| {
                term_matches(&address, term)
                    || term_matches(&place, term)
                    || (term.len() > 2 && name.contains(term))
            })
        }
        None => {
            let address = node.address.to_lowercase();
            let place = node.location.to_lowercase();
            !location.is_empty() && (address.contains(&location) || place.contains(&location))
        }
    }
}

/// Nodes in `location`, sorted by VSN.
pub fn nodes_in_location<'a>(nodes: &'a [NodeManifest], location: &str) -> Vec<&'a NodeManifest> {
    let mut matching: Vec<&NodeManifest> = nodes
        .iter()
        .filter(|node| node_in_location(node, location))
        .collect();
    matching.sort_by(|a, b| a.vsn.cmp(&b.vsn));
    matching
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Min,
    Max,
    Avg,
}

impl StatKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "min" | "minimum" => Some(StatKind::Min),
            "max" | "maximum" => Some(StatKind::Max),
            "avg" | "mean" | "average" => Some(StatKind::Avg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            _ => None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid filter expression '{0}': expected `value <op> number` with op one of >, >=, <, <=, ==, !=")]
pub struct FilterExprError(String);

lazy_static! {
    static ref FILTER_RE: Regex =
        Regex::new(r"^\s*value\s*(>=|<=|==|!=|>|<)\s*(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)\s*$")
            .unwrap();
}

/// `value <op> number`, applied to numeric readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueFilter {
    op: CompareOp,
    threshold: f64,
}

impl ValueFilter {
    /// Parses a filter; an empty expression means no filter.
    pub fn parse(raw: &str) -> Result<Option<Self>, FilterExprError> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let caps = FILTER_RE
            .captures(raw)
            .ok_or_else(|| FilterExprError(raw.trim().to_string()))?;
        let op = CompareOp::parse(&caps[1]).ok_or_else(|| FilterExprError(raw.to_string()))?;
        let threshold = caps[2]
            .parse::<f64>()
            .map_err(|_| FilterExprError(raw.trim().to_string()))?;
        Ok(Some(Self { op, threshold }))
    }

    pub fn accepts(&self, value: f64) -> bool {
        match self.op {
            CompareOp::Gt => value > self.threshold,
            CompareOp::Ge => value >= self.threshold,
            CompareOp::Lt => value < self.threshold,
            CompareOp::Le => value <= self.threshold,
            CompareOp::Eq => value == self.threshold,
            CompareOp::Ne => value != self.threshold,
        }
    }
}

impl fmt::Display for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value {} {}", self.op.symbol(), self.threshold)
    }
}

/// Unit and description of the rain gauge measurements.
pub fn rain_gauge_meta(measurement: &str) -> Option<(&'static str, &'static str)> {
    match measurement {
        "env.raingauge.rint" => Some((
            "mm/hr",
            "Hydreon RG-15 rain gauge rain intensity (past minute, extrapolated to hour)",
        )),
        "env.raingauge.event_acc" => Some((
            "mm",
            "Hydreon RG-15 rain gauge rain event precipitation accumulation (resets 60 min after last drop)",
        )),
        "env.raingauge.total_acc" => Some((
            "mm",
            "Hydreon RG-15 rain gauge total precipitation accumulation (since last reset)",
        )),
        _ => None,
    }
}

pub fn is_rain_gauge(measurement: &str) -> bool {
    measurement.starts_with("env.raingauge")
}
