//! Plugin metadata as published by the edge code repository.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Accepts `null` where a string is expected.
fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInput {
    #[serde(deserialize_with = "nullable_string")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "nullable_string")]
    pub input_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginMetadata {
    #[serde(deserialize_with = "nullable_string")]
    pub id: String,
    #[serde(deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(deserialize_with = "nullable_string")]
    pub namespace: String,
    #[serde(deserialize_with = "nullable_string")]
    pub version: String,
    #[serde(deserialize_with = "nullable_string")]
    pub description: String,
    #[serde(deserialize_with = "nullable_string")]
    pub keywords: String,
    #[serde(deserialize_with = "nullable_string")]
    pub authors: String,
    #[serde(deserialize_with = "nullable_string")]
    pub homepage: String,
    pub inputs: Vec<PluginInput>,
    pub metadata: BTreeMap<String, Value>,
    /// Path of the science description under the meta-files endpoint.
    #[serde(deserialize_with = "nullable_string")]
    pub science_description: String,
    /// Fetched text of `science_description`.
    #[serde(deserialize_with = "nullable_string")]
    pub science_description_content: String,
}

impl PluginMetadata {
    /// `namespace/name:version`
    pub fn full_name(&self) -> String {
        format!("{}/{}:{}", self.namespace, self.name, self.version)
    }

    /// Lowercased text searched by word and category matching.
    pub fn search_text(&self) -> String {
        let metadata = self
            .metadata
            .values()
            .filter_map(|v| match v {
                Value::Null => None,
                Value::String(s) if s.is_empty() => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(" ");
        [
            self.name.as_str(),
            self.description.as_str(),
            self.keywords.as_str(),
            self.science_description_content.as_str(),
            metadata.as_str(),
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }

    /// Pattern matching the plugin's records in the data API.
    pub fn data_pattern(&self) -> String {
        format!(".*{}.*", self.name)
    }
}
