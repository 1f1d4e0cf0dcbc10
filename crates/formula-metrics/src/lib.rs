//! Declarative metric computation over tabular data.
//!
//! A metric is a named recipe: filter the input table, run one or more registered methods over the
//! remaining rows, optionally once per split group. Results land in a [`MetricsStore`] indexed by
//! `(metric, method)` and by every dimension coordinate they contain.

mod config;
mod error;
mod filter;
mod generate;
mod invoke;
mod mask;
mod registry;
mod result;
mod similarity;
mod split;
mod store;
mod table;
mod value;

pub use crate::config::{
    normalize_method_specs, read_metric_instructions, MetricConfig, MetricInstructions,
    SplitOverride, INSTRUCTIONS_KEY,
};
pub use crate::error::{MethodError, MetricsError, MetricsResult};
pub use crate::filter::{apply_filter, evaluate, CompareOp, Condition, FilterExpr};
pub use crate::generate::{generate_metrics, generate_metrics_from_json, generate_metrics_from_path};
pub use crate::invoke::{apply_methods, invoke, resolve_methods, MethodSpec};
pub use crate::mask::RowMask;
pub use crate::registry::{
    default_registry, register_method, MethodFn, MethodMetadata, MethodRegistry, MetricMethod,
    Params,
};
pub use crate::result::{
    create_result, MethodOutput, Record, ResultData, ResultTable, Series, TypedResult, ValueType,
    DEFAULT_DIMENSION, DEFAULT_VALUE_COLUMN,
};
pub use crate::split::{combine_split_results, normalize_split_by, split_and_combine, validate_split_columns};
pub use crate::store::{MetricsStore, ResultKey, ResultSummary, StoreQuery};
pub use crate::table::Table;
pub use crate::value::Value;
