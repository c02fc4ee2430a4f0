//! Text rendering of manifests for tool results.

use std::fmt::Write;

use super::models::{Hardware, NodeDetail, NodeManifest, SensorHardware};

const MAX_DESCRIPTION_LENGTH: usize = 300;
const SENSORS_LISTED: usize = 5;

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "Unknown"
    } else {
        value
    }
}

fn write_hardware(out: &mut String, title: &str, items: &[Hardware]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{} ({}):", title, items.len());
    for item in items {
        let status = if item.is_active { "Active" } else { "Inactive" };
        let _ = writeln!(
            out,
            "- {}: {} ({}) - {}",
            or_unknown(&item.name),
            or_unknown(&item.hw_model),
            or_unknown(&item.manufacturer),
            status
        );
        if !item.capabilities.is_empty() {
            let _ = writeln!(out, "  Capabilities: {}", item.capabilities.join(", "));
        }
    }
}

pub fn node_detail(vsn: &str, node: &NodeDetail) -> String {
    let mut out = format!("Node {} Information:\n", vsn);
    for (label, value) in [
        ("Name", &node.name),
        ("Project", &node.project),
        ("Type", &node.node_type),
        ("Focus", &node.focus),
        ("Phase", &node.phase),
        ("Location", &node.location),
        ("Address", &node.address),
    ] {
        let _ = writeln!(out, "- {}: {}", label, or_unknown(value));
    }
    if let Some((lat, lon)) = node.gps() {
        let _ = writeln!(out, "- GPS: {}, {}", lat, lon);
    }
    write_hardware(&mut out, "Sensors", &node.sensors);
    write_hardware(&mut out, "Compute Resources", &node.computes);
    out
}

/// All nodes, deployed ones first.
pub fn node_list(nodes: &[NodeManifest]) -> String {
    let mut deployed = Vec::new();
    let mut other = Vec::new();
    for node in nodes {
        let mut line = format!("- {} ({})", or_unknown(&node.vsn), or_unknown(&node.name));
        if node.phase == "Deployed" {
            if !node.address.is_empty() {
                let _ = write!(line, ": {}", node.address);
            }
            deployed.push(line);
        } else {
            let phase = if node.phase.is_empty() {
                "Unknown phase"
            } else {
                &node.phase
            };
            let _ = write!(line, ": {}", phase);
            other.push(line);
        }
    }

    let mut out = format!("Available SAGE Nodes ({}):\n", nodes.len());
    if !deployed.is_empty() {
        let _ = write!(out, "\n\nDeployed Nodes:\n{}", deployed.join("\n"));
    }
    if !other.is_empty() {
        let _ = write!(out, "\n\nOther Nodes:\n{}", other.join("\n"));
    }
    out.push_str(
        "\n\nFor detailed information about a specific node, use get_node_info with the node ID.",
    );
    out
}

fn clean_description(raw: &str) -> String {
    let cleaned = raw
        .replace("# ", "")
        .replace("\r\n\r\n", "\n")
        .replace("\r\n", " ");
    if cleaned.chars().count() > MAX_DESCRIPTION_LENGTH {
        let clipped: String = cleaned.chars().take(MAX_DESCRIPTION_LENGTH - 3).collect();
        format!("{}...", clipped)
    } else {
        cleaned
    }
}

pub fn sensor_matches(query: &str, sensors: &[&SensorHardware]) -> String {
    let mut out = format!(
        "Sensor Information for '{}' (Found {} matches):\n",
        query,
        sensors.len()
    );
    for (i, sensor) in sensors.iter().enumerate() {
        let _ = writeln!(out, "\n--- Sensor {}: {} ---", i + 1, or_unknown(&sensor.hw_model));
        let _ = writeln!(out, "- Hardware ID: {}", or_unknown(&sensor.hardware));
        let _ = writeln!(out, "- Manufacturer: {}", or_unknown(&sensor.manufacturer));
        if !sensor.capabilities.is_empty() {
            let _ = writeln!(out, "- Capabilities: {}", sensor.capabilities.join(", "));
        }
        if !sensor.datasheet.is_empty() {
            let _ = writeln!(out, "- Datasheet: {}", sensor.datasheet);
        }
        if !sensor.vsns.is_empty() {
            let _ = writeln!(out, "- Used in nodes: {}", sensor.vsns.join(", "));
        }
        if !sensor.description.is_empty() {
            let _ = writeln!(out, "- Description: {}", clean_description(&sensor.description));
        }
    }
    out
}

pub fn location_matches(location: &str, nodes: &[&NodeManifest]) -> String {
    let mut out = format!("Found {} nodes in or near {}:\n\n", nodes.len(), location);
    for node in nodes {
        let _ = writeln!(out, "- Node {}: {}", or_unknown(&node.vsn), or_unknown(&node.name));
        let address = if node.address.is_empty() {
            "Unknown location"
        } else {
            &node.address
        };
        let phase = if node.phase.is_empty() {
            "Unknown phase"
        } else {
            &node.phase
        };
        let _ = writeln!(out, "  Location: {}", address);
        let _ = writeln!(out, "  Status: {}", phase);
        if !node.sensors.is_empty() {
            let names: Vec<&str> = node.sensors.iter().map(|s| or_unknown(&s.name)).collect();
            let _ = write!(
                out,
                "  Sensors: {}",
                names[..names.len().min(SENSORS_LISTED)].join(", ")
            );
            if names.len() > SENSORS_LISTED {
                let _ = write!(out, " and {} more", names.len() - SENSORS_LISTED);
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_list_groups_by_phase() {
        let nodes = vec![
            NodeManifest {
                vsn: "W023".to_string(),
                name: "argonne".to_string(),
                phase: "Deployed".to_string(),
                address: "Lemont, IL".to_string(),
                ..Default::default()
            },
            NodeManifest {
                vsn: "W0X1".to_string(),
                name: "bench".to_string(),
                phase: "Maintenance".to_string(),
                ..Default::default()
            },
        ];
        let text = node_list(&nodes);
        assert!(text.starts_with("Available SAGE Nodes (2):"));
        assert!(text.contains("Deployed Nodes:\n- W023 (argonne): Lemont, IL"));
        assert!(text.contains("Other Nodes:\n- W0X1 (bench): Maintenance"));
    }

    #[test]
    fn test_node_detail_sections() {
        let detail = NodeDetail {
            name: "argonne".to_string(),
            sensors: vec![Hardware {
                name: "bme680".to_string(),
                hw_model: "BME680".to_string(),
                manufacturer: "Bosch".to_string(),
                is_active: true,
                capabilities: vec!["temperature".to_string()],
            }],
            ..Default::default()
        };
        let text = node_detail("W023", &detail);
        assert!(text.contains("- Name: argonne\n- Project: Unknown"));
        assert!(text.contains("Sensors (1):\n- bme680: BME680 (Bosch) - Active\n  Capabilities: temperature"));
        assert!(!text.contains("GPS"));
        assert!(!text.contains("Compute Resources"));
    }

    #[test]
    fn test_clean_description_clips() {
        assert_eq!(clean_description("# Title\r\n\r\nBody\r\nmore"), "Title\nBody more");
        let long = "a".repeat(400);
        let clipped = clean_description(&long);
        assert_eq!(clipped.chars().count(), MAX_DESCRIPTION_LENGTH);
        assert!(clipped.ends_with("..."));
    }

    #[test]
    fn test_location_matches_lists_sensors() {
        let sensors = (0..7)
            .map(|i| Hardware {
                name: format!("s{}", i),
                ..Default::default()
            })
            .collect();
        let node = NodeManifest {
            vsn: "W023".to_string(),
            name: "argonne".to_string(),
            sensors,
            ..Default::default()
        };
        let text = location_matches("Lemont", &[&node]);
        assert!(text.contains("- Node W023: argonne\n  Location: Unknown location\n  Status: Unknown phase"));
        assert!(text.contains("Sensors: s0, s1, s2, s3, s4 and 2 more"));
    }
}
