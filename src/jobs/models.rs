//! Job definitions and their scheduler YAML rendering.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::JobError;

/// Ordered plugin arguments rendered as `--key value` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginArguments(Vec<(String, String)>);

fn json_arg_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

impl PluginArguments {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }

    /// Parses a JSON object (`{"width": 640}`) or comma separated
    /// `key=value` pairs (`width=640,height=480`).
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        if raw.starts_with('{') {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| JobError::InvalidArguments(e.to_string()))?;
            let object = value
                .as_object()
                .ok_or_else(|| JobError::InvalidArguments("expected a JSON object".to_string()))?;
            return Ok(Self(
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), json_arg_value(v)))
                    .collect(),
            ));
        }

        let mut pairs = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                JobError::InvalidArguments(format!("expected key=value, got {:?}", part))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(JobError::InvalidArguments(format!(
                    "missing key in {:?}",
                    part
                )));
            }
            pairs.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self(pairs))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `["--key", "value", ...]`; keys already starting with `-` are kept.
    pub fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(key, value)| {
                let flag = if key.starts_with('-') {
                    key.clone()
                } else {
                    format!("--{}", key)
                };
                [flag, value.clone()]
            })
            .collect()
    }
}

/// Node resources a plugin needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorRequirements {
    pub gpu: bool,
    pub camera: bool,
    pub usb: bool,
    pub custom: BTreeMap<String, String>,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl SelectorRequirements {
    pub fn gpu() -> Self {
        Self {
            gpu: true,
            ..Default::default()
        }
    }

    pub fn camera() -> Self {
        Self {
            camera: true,
            ..Default::default()
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.custom.insert(key.to_string(), value.to_string());
        self
    }

    /// Parses `{"resource.gpu": "true", "zone": "core"}`; the short keys
    /// `gpu`, `camera` and `usb` accept booleans too.
    pub fn parse_json(raw: &str) -> Result<Self, JobError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let value: Value =
            serde_json::from_str(raw).map_err(|e| JobError::InvalidSelector(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| JobError::InvalidSelector("expected a JSON object".to_string()))?;

        let mut selector = Self::default();
        for (key, value) in object {
            match key.as_str() {
                "gpu" | "resource.gpu" => selector.gpu = truthy(value),
                "camera" | "resource.camera" => selector.camera = truthy(value),
                "usb" | "resource.usb" => selector.usb = truthy(value),
                _ => {
                    selector.custom.insert(key.clone(), json_arg_value(value));
                }
            }
        }
        Ok(selector)
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (flag, key) in [
            (self.gpu, "resource.gpu"),
            (self.camera, "resource.camera"),
            (self.usb, "resource.usb"),
        ] {
            if flag {
                map.insert(key.to_string(), "true".to_string());
            }
        }
        map.extend(self.custom.clone());
        map
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginSpec {
    pub name: String,
    pub image: String,
    pub args: Vec<String>,
    pub selector: SelectorRequirements,
    pub env: BTreeMap<String, String>,
    pub privileged: bool,
    pub entrypoint: Option<String>,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            args: Vec::new(),
            selector: SelectorRequirements::default(),
            env: BTreeMap::new(),
            privileged: false,
            entrypoint: None,
        }
    }

    pub fn args(mut self, args: PluginArguments) -> Self {
        self.args = args.to_args();
        self
    }

    pub fn raw_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn selector(mut self, selector: SelectorRequirements) -> Self {
        self.selector = selector;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn entrypoint(mut self, entrypoint: &str) -> Self {
        self.entrypoint = Some(entrypoint.to_string());
        self
    }
}

/// Value written for each node under `nodes:`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeValue {
    #[default]
    Null,
    True,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub name: String,
    pub nodes: Vec<String>,
    pub plugins: Vec<PluginSpec>,
    pub science_rules: Vec<String>,
    pub success_criteria: Vec<String>,
    pub node_value: NodeValue,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, nodes: Vec<String>) -> Self {
        Self {
            name: name.into(),
            nodes,
            plugins: Vec::new(),
            science_rules: Vec::new(),
            success_criteria: Vec::new(),
            node_value: NodeValue::Null,
        }
    }

    pub fn plugin(mut self, plugin: PluginSpec) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.science_rules.push(rule.into());
        self
    }

    pub fn to_yaml(&self) -> Result<String, JobError> {
        let plugins = self
            .plugins
            .iter()
            .map(|p| PluginYaml {
                name: &p.name,
                plugin_spec: PluginSpecYaml {
                    image: &p.image,
                    args: p.args.clone(),
                    selector: p.selector.to_map(),
                    env: p.env.clone(),
                    privileged: p.privileged,
                    entrypoint: p.entrypoint.as_deref(),
                    volume: BTreeMap::new(),
                },
            })
            .collect();
        let node_value = match self.node_value {
            NodeValue::Null => None,
            NodeValue::True => Some(true),
        };
        let yaml = JobYaml {
            name: &self.name,
            plugins,
            nodes: self.nodes.iter().map(|n| (n.as_str(), node_value)).collect(),
            science_rules: &self.science_rules,
            success_criteria: &self.success_criteria,
        };
        Ok(serde_yaml::to_string(&yaml)?)
    }
}

#[derive(Serialize)]
struct JobYaml<'a> {
    name: &'a str,
    plugins: Vec<PluginYaml<'a>>,
    nodes: BTreeMap<&'a str, Option<bool>>,
    #[serde(rename = "scienceRules")]
    science_rules: &'a [String],
    #[serde(rename = "successCriteria")]
    success_criteria: &'a [String],
}

#[derive(Serialize)]
struct PluginYaml<'a> {
    name: &'a str,
    #[serde(rename = "pluginSpec")]
    plugin_spec: PluginSpecYaml<'a>,
}

#[derive(Serialize)]
struct PluginSpecYaml<'a> {
    image: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    args: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    selector: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    privileged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    entrypoint: Option<&'a str>,
    volume: BTreeMap<String, String>,
}

/// `schedule("p"): cronjob("p", "<cron>")`
pub fn cron_rule(plugin: &str, cron: &str) -> String {
    format!(r#"schedule("{0}"): cronjob("{0}", "{1}")"#, plugin, cron)
}

/// Cron expression firing every `minutes` minutes.
pub fn every_minutes(minutes: u32) -> String {
    format!("*/{} * * * *", minutes.max(1))
}

/// `schedule("p"): True`, i.e. run continuously.
pub fn always_rule(plugin: &str) -> String {
    format!(r#"schedule("{}"): True"#, plugin)
}
