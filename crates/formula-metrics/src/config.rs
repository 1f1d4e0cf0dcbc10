//! Metric instruction documents.
//!
//! Instructions are read into a `serde_json::Value` (YAML files go through `serde_yaml`) and
//! validated once into [`MetricInstructions`]; nothing downstream looks at the raw document again.

use crate::error::{MetricsError, MetricsResult};
use crate::filter::FilterExpr;
use crate::invoke::MethodSpec;
use crate::registry::Params;
use crate::split::normalize_split_by;
use std::path::{Path, PathBuf};

/// Top-level key holding the instructions inside a YAML configuration file.
pub const INSTRUCTIONS_KEY: &str = "metric_instructions";

const SPLIT_BY_KEY: &str = "split_by";

/// Per-metric `split_by` setting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SplitOverride {
    /// No `split_by` key: use the global split, if any.
    #[default]
    Inherit,
    /// `split_by: null` or `split_by: []`.
    Disabled,
    Columns(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricConfig {
    pub name: String,
    pub methods: Vec<MethodSpec>,
    pub filter: FilterExpr,
    pub split_by: SplitOverride,
}

impl MetricConfig {
    /// Split columns in effect for this metric, given the global setting.
    pub fn effective_split<'a>(&'a self, global: Option<&'a [String]>) -> Option<&'a [String]> {
        match &self.split_by {
            SplitOverride::Inherit => global,
            SplitOverride::Disabled => None,
            SplitOverride::Columns(columns) => Some(columns.as_slice()),
        }
    }

    fn from_json(name: &str, body: &serde_json::Value) -> MetricsResult<Self> {
        let serde_json::Value::Object(map) = body else {
            return Err(MetricsError::specification(
                format!("metric '{name}' instruction must be a mapping"),
                body,
            ));
        };

        let methods = map.get("method").ok_or_else(|| {
            MetricsError::specification(format!("metric '{name}' is missing the 'method' key"), body)
        })?;

        let filter = match map.get("filter") {
            Some(filter) => FilterExpr::parse(filter)?,
            None => FilterExpr::All,
        };

        let split_by = match map.get(SPLIT_BY_KEY) {
            None => SplitOverride::Inherit,
            Some(raw) => match normalize_split_by(raw)? {
                Some(columns) => SplitOverride::Columns(columns),
                None => SplitOverride::Disabled,
            },
        };

        Ok(Self {
            name: name.to_string(),
            methods: normalize_method_specs(methods)?,
            filter,
            split_by,
        })
    }
}

/// Accepts `"name"`, `{name: {params}}`, or a list mixing both.
pub fn normalize_method_specs(raw: &serde_json::Value) -> MetricsResult<Vec<MethodSpec>> {
    match raw {
        serde_json::Value::String(name) => Ok(vec![MethodSpec::new(name.clone())]),
        serde_json::Value::Object(_) => Ok(vec![parse_method_mapping(raw)?]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(name) => Ok(MethodSpec::new(name.clone())),
                serde_json::Value::Object(_) => parse_method_mapping(item),
                other => Err(MetricsError::specification(
                    "method list items must be strings or mappings",
                    other,
                )),
            })
            .collect(),
        other => Err(MetricsError::specification(
            "method must be a string, a list or a mapping",
            other,
        )),
    }
}

fn parse_method_mapping(raw: &serde_json::Value) -> MetricsResult<MethodSpec> {
    let serde_json::Value::Object(map) = raw else {
        return Err(MetricsError::specification("method must be a mapping", raw));
    };
    let mut entries = map.iter();
    let (Some((name, params)), None) = (entries.next(), entries.next()) else {
        return Err(MetricsError::specification(
            "method mapping must contain exactly one method",
            raw,
        ));
    };
    match params {
        serde_json::Value::Object(params) => Ok(MethodSpec::with_params(
            name.clone(),
            Params::from_map(params.clone()),
        )),
        serde_json::Value::Null => Ok(MethodSpec::new(name.clone())),
        _ => Err(MetricsError::specification(
            format!("parameters of method '{name}' must be a mapping"),
            raw,
        )),
    }
}

/// Validated metric instructions: an optional global split and the metrics in document order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricInstructions {
    pub split_by: Option<Vec<String>>,
    pub metrics: Vec<MetricConfig>,
}

impl MetricInstructions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(doc: &serde_json::Value) -> MetricsResult<Self> {
        let map = match doc {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => return Ok(Self::default()),
            other => {
                return Err(MetricsError::specification(
                    "metric instructions must be a mapping",
                    other,
                ))
            }
        };

        let mut instructions = Self::default();
        for (key, value) in map {
            if key == SPLIT_BY_KEY {
                instructions.split_by = normalize_split_by(value)?;
            } else {
                instructions.metrics.push(MetricConfig::from_json(key, value)?);
            }
        }
        Ok(instructions)
    }

    /// Parse a YAML document holding the instructions themselves (no `metric_instructions` key).
    pub fn from_yaml_str(text: &str) -> MetricsResult<Self> {
        let doc = parse_yaml(text, Path::new("<string>"))?;
        Self::from_json(&doc)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn metric(&self, name: &str) -> Option<&MetricConfig> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

fn parse_yaml(text: &str, path: &Path) -> MetricsResult<serde_json::Value> {
    serde_yaml::from_str(text).map_err(|source| MetricsError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the `metric_instructions` section of a YAML configuration file.
///
/// A file without that section yields empty instructions (and a warning).
pub fn read_metric_instructions(path: impl AsRef<Path>) -> MetricsResult<MetricInstructions> {
    let path = path.as_ref();
    log::debug!("reading metric configuration from {}", path.display());

    let text = std::fs::read_to_string(path).map_err(|source| MetricsError::ConfigIo {
        path: PathBuf::from(path),
        source,
    })?;
    let doc = parse_yaml(&text, path)?;
    let mut root = match doc {
        serde_json::Value::Object(root) => root,
        other => {
            return Err(MetricsError::specification(
                format!("configuration file {} must contain a mapping", path.display()),
                &other,
            ))
        }
    };

    match root.remove(INSTRUCTIONS_KEY) {
        Some(section) => {
            let instructions = MetricInstructions::from_json(&section)?;
            if instructions.is_empty() {
                log::warn!("'{INSTRUCTIONS_KEY}' in {} defines no metrics", path.display());
            } else {
                log::debug!("loaded {} metric configuration(s)", instructions.len());
            }
            Ok(instructions)
        }
        None => {
            log::warn!("no '{INSTRUCTIONS_KEY}' found in {}", path.display());
            Ok(MetricInstructions::default())
        }
    }
}
