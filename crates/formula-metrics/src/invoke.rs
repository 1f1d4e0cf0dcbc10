use crate::error::{MetricsError, MetricsResult};
use crate::registry::{MethodRegistry, MetricMethod, Params};
use crate::result::{create_result, TypedResult};
use crate::table::Table;
use md5::{Digest, Md5};
use std::fmt::Write as _;
use std::sync::Arc;

/// Longest parameter rendering kept verbatim in a result key before it is hashed.
const MAX_PARAM_REPR_LEN: usize = 50;

/// One method to run for a metric, with its keyword parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MethodSpec {
    pub name: String,
    pub params: Params,
}

impl MethodSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Key under which this invocation's result is stored.
    ///
    /// Parameterless specs use the bare name. Otherwise the parameters are sorted by key and
    /// rendered as `name_k1v1_k2v2`; when that rendering would be unwieldy, the first eight hex
    /// digits of its MD5 digest are used instead (`name_1a2b3c4d`).
    pub fn result_key(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }

        let mut params: Vec<(&String, &serde_json::Value)> = self.params.iter().collect();
        params.sort_by(|a, b| a.0.cmp(b.0));

        let repr = format!(
            "[{}]",
            params
                .iter()
                .map(|(k, v)| format!("('{k}', {v})"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        if repr.len() > MAX_PARAM_REPR_LEN {
            let digest = Md5::digest(repr.as_bytes());
            let mut key = format!("{}_", self.name);
            for byte in &digest[..4] {
                let _ = write!(key, "{byte:02x}");
            }
            return key;
        }

        let rendered = params
            .iter()
            .map(|(k, v)| format!("{k}{}", param_text(v)))
            .collect::<Vec<_>>()
            .join("_");
        format!("{}_{rendered}", self.name)
    }
}

fn param_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Look up every spec in `registry`, failing on the first unknown name.
pub fn resolve_methods(
    specs: &[MethodSpec],
    registry: &MethodRegistry,
) -> MetricsResult<Vec<(MethodSpec, Arc<MetricMethod>)>> {
    specs
        .iter()
        .map(|spec| Ok((spec.clone(), registry.get(&spec.name)?)))
        .collect()
}

/// Run one method over `table` and normalize its output.
///
/// Errors raised by the method body are returned as [`MetricsError::MethodExecution`] with the
/// original error untouched.
pub fn invoke(
    method: &MetricMethod,
    metric: &str,
    table: &Table,
    spec: &MethodSpec,
) -> MetricsResult<TypedResult> {
    log::trace!(
        "applying method '{}' with {} param(s) to {} rows",
        spec.name,
        spec.params.len(),
        table.row_count()
    );
    let output = method
        .call(table, &spec.params)
        .map_err(MetricsError::MethodExecution)?;
    create_result(metric, &spec.result_key(), output, method.value_column())
}

/// Run every resolved method over `table`, in order.
pub fn apply_methods(
    table: &Table,
    methods: &[(MethodSpec, Arc<MetricMethod>)],
    metric: &str,
) -> MetricsResult<Vec<TypedResult>> {
    methods
        .iter()
        .map(|(spec, method)| invoke(method, metric, table, spec))
        .collect()
}
