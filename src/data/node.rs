//! Node identifiers (VSNs).

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

lazy_static! {
    static ref VSN_RE: Regex = Regex::new(r"^[A-Z0-9]{1,8}$").unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("invalid node id {0:?}: expected up to 8 letters or digits, e.g. W023")]
    Invalid(String),
    #[error("no nodes specified")]
    Empty,
}

/// Normalizes a node id: trimmed, uppercased and prefixed with `W` when
/// missing. `*` and an empty id mean "all nodes" and come back unchanged
/// (`*` or empty respectively).
pub fn normalize_node_id(raw: &str) -> String {
    let clean = raw.trim().to_uppercase();
    if clean.is_empty() || clean == "*" || clean.starts_with('W') {
        clean
    } else {
        format!("W{}", clean)
    }
}

/// Whether a normalized id selects every node.
pub fn is_all_nodes(id: &str) -> bool {
    id.is_empty() || id == "*"
}

/// Validates a node id as given in a job definition (no `W` prefixing).
pub fn validate_vsn(raw: &str) -> Result<String, NodeIdError> {
    let clean = raw.trim().to_uppercase();
    if VSN_RE.is_match(&clean) {
        Ok(clean)
    } else {
        Err(NodeIdError::Invalid(raw.trim().to_string()))
    }
}

/// Parses a comma separated node list. Empty entries are dropped, the
/// remaining ones must be valid VSNs and at least one is required.
pub fn parse_node_list(raw: &str) -> Result<Vec<String>, NodeIdError> {
    let nodes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(validate_vsn)
        .collect::<Result<Vec<_>, _>>()?;
    if nodes.is_empty() {
        return Err(NodeIdError::Empty);
    }
    Ok(nodes)
}
