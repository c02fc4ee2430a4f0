//! Manifest documents served by the node registry.
//!
//! The registry is loose about optional fields, so everything but the
//! VSN has a default.

use serde::Deserialize;
use serde_json::Value;

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Hardware {
    pub name: String,
    pub hw_model: String,
    pub manufacturer: String,
    pub is_active: bool,
    pub capabilities: Vec<String>,
}

/// A node as listed in `/manifests/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeManifest {
    pub vsn: String,
    pub name: String,
    pub phase: String,
    pub address: String,
    pub location: String,
    pub sensors: Vec<Hardware>,
}

/// A node as returned by the node detail endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeDetail {
    pub vsn: String,
    pub name: String,
    pub project: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub focus: String,
    pub phase: String,
    pub location: String,
    pub address: String,
    pub gps_lat: Value,
    pub gps_lon: Value,
    pub sensors: Vec<Hardware>,
    pub computes: Vec<Hardware>,
}

impl NodeDetail {
    /// `(lat, lon)` when both are known.
    pub fn gps(&self) -> Option<(String, String)> {
        Some((display_value(&self.gps_lat)?, display_value(&self.gps_lon)?))
    }
}

/// A sensor hardware entry from `/sensors/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SensorHardware {
    pub hardware: String,
    pub hw_model: String,
    pub manufacturer: String,
    pub capabilities: Vec<String>,
    pub datasheet: String,
    pub vsns: Vec<String>,
    pub description: String,
}

impl SensorHardware {
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.hardware.to_lowercase().contains(&query)
            || self.hw_model.to_lowercase().contains(&query)
            || self
                .capabilities
                .iter()
                .any(|c| c.to_lowercase().contains(&query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_detail_lenient() {
        let detail: NodeDetail = serde_json::from_str(
            r#"{"vsn": "W023", "type": "WSN", "gps_lat": 41.7, "gps_lon": "-87.9", "extra": 1}"#,
        )
        .unwrap();
        assert_eq!(detail.node_type, "WSN");
        assert_eq!(detail.gps(), Some(("41.7".to_string(), "-87.9".to_string())));
        assert!(detail.sensors.is_empty());

        let detail: NodeDetail = serde_json::from_str(r#"{"vsn": "W024", "gps_lat": ""}"#).unwrap();
        assert!(detail.gps().is_none());
    }

    #[test]
    fn test_sensor_matches() {
        let sensor = SensorHardware {
            hardware: "bme680".to_string(),
            hw_model: "BME680".to_string(),
            capabilities: vec!["Temperature".to_string(), "humidity".to_string()],
            ..Default::default()
        };
        assert!(sensor.matches("BME"));
        assert!(sensor.matches("temp"));
        assert!(!sensor.matches("camera"));
    }
}
