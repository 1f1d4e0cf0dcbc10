use crate::result::ValueType;
use std::path::PathBuf;

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Error type returned by user-supplied metric methods.
pub type MethodError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("invalid metric specification: {issue}. Specification: {fragment}")]
    InvalidSpecification { issue: String, fragment: String },

    #[error("metric '{metric}': split_by columns not found in data: {missing:?}")]
    MissingSplitColumns { metric: String, missing: Vec<String> },

    #[error(
        "metric '{metric}': method '{method}' returned mixed result types across split groups: {found:?}"
    )]
    MixedSplitResults {
        metric: String,
        method: String,
        found: Vec<ValueType>,
    },

    #[error(
        "metric '{metric}': method '{method}' returned {what} that differ across split groups: {found:?}"
    )]
    InconsistentSplitResults {
        metric: String,
        method: String,
        what: &'static str,
        found: Vec<String>,
    },

    #[error(
        "metric method '{name}' is not registered. Available methods: {}{}",
        format_available(.available),
        format_suggestions(.suggestions)
    )]
    MethodNotFound {
        name: String,
        available: Vec<String>,
        suggestions: Vec<String>,
    },

    #[error("failed to register metric method '{name}': {reason}")]
    MethodRegistration { name: String, reason: String },

    #[error("cannot perform {operation} on an empty method registry")]
    EmptyRegistry { operation: String },

    /// An error raised inside a metric method body, passed through untouched.
    #[error("{0}")]
    MethodExecution(#[source] MethodError),

    #[error(
        "metric '{metric}': method '{method}' returned a mapping without a 'data' or 'value' key (found keys: {returned_keys:?})"
    )]
    InvalidResultFormat {
        metric: String,
        method: String,
        returned_keys: Vec<String>,
    },

    #[error("schema mismatch: expected {expected} values, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("duplicate column: {column}")]
    DuplicateColumn { column: String },

    #[error("unknown column: {column}")]
    UnknownColumn { column: String },

    #[error("no result stored for metric '{metric}', method '{method}'")]
    ResultNotFound { metric: String, method: String },

    #[error("failed to read configuration file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl MetricsError {
    pub(crate) fn specification(issue: impl Into<String>, fragment: &serde_json::Value) -> Self {
        MetricsError::InvalidSpecification {
            issue: issue.into(),
            fragment: fragment.to_string(),
        }
    }
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        "None".to_string()
    } else {
        available.join(", ")
    }
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(". Did you mean one of: {}?", suggestions.join(", "))
    }
}
