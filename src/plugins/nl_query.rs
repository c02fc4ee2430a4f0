//! Turns a plain-language data request into query parameters.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TIME_RE: Regex =
        Regex::new(r"(\d+)\s*(hours?|hrs?|minutes?|mins?|days?)\b").unwrap();
    static ref NODE_RE: Regex = Regex::new(r"(?i)\bW[0-9][0-9A-Z]{0,6}\b").unwrap();
}

const NL_DEFAULT_TIME_RANGE: &str = "-1h";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NlQuery {
    pub time_range: String,
    pub nodes: Vec<String>,
    /// Data API plugin pattern for camera style requests.
    pub plugin_pattern: Option<&'static str>,
    /// Registry keyword to look plugins up by.
    pub category: Option<&'static str>,
}

fn mentions(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

pub fn parse(query: &str) -> NlQuery {
    let lower = query.to_lowercase();
    let detection = mentions(&lower, &["yolo", "detect", "recognition"]);

    let (plugin_pattern, category) = if mentions(&lower, &["ptz", "pan", "tilt", "zoom"]) {
        let pattern = if detection { ".*ptzapp-yolo.*" } else { ".*ptz.*" };
        (Some(pattern), Some("camera"))
    } else if mentions(&lower, &["image", "camera", "photo", "picture"]) {
        let pattern = if detection {
            ".*yolo.*"
        } else {
            ".*imagesampler.*|.*camera.*"
        };
        (Some(pattern), Some("camera"))
    } else if mentions(
        &lower,
        &["temperature", "humidity", "pressure", "weather", "environmental"],
    ) {
        (None, Some("environmental"))
    } else if mentions(&lower, &["audio", "sound", "microphone", "recording"]) {
        (None, Some("audio"))
    } else if mentions(&lower, &["cloud", "rain", "precipitation", "sky"]) {
        (None, Some("rain"))
    } else {
        (None, None)
    };

    let time_range = TIME_RE
        .captures(&lower)
        .map(|caps| {
            let unit = match &caps[2] {
                u if u.starts_with('h') => 'h',
                u if u.starts_with('d') => 'd',
                _ => 'm',
            };
            format!("-{}{}", &caps[1], unit)
        })
        .unwrap_or_else(|| NL_DEFAULT_TIME_RANGE.to_string());

    let mut nodes: Vec<String> = Vec::new();
    for m in NODE_RE.find_iter(query) {
        let node = m.as_str().to_uppercase();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }

    NlQuery {
        time_range,
        nodes,
        plugin_pattern,
        category,
    }
}
