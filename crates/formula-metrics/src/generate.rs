use crate::config::{read_metric_instructions, MetricConfig, MetricInstructions};
use crate::error::MetricsResult;
use crate::filter::apply_filter;
use crate::invoke::{apply_methods, resolve_methods};
use crate::registry::{default_registry, MethodRegistry};
use crate::split::split_and_combine;
use crate::store::MetricsStore;
use crate::table::Table;
use std::path::Path;

/// Evaluate every metric in `instructions` against `table`.
///
/// Methods are looked up in `registry`, or in [`default_registry`] when `None`. The first error
/// aborts the run; results computed for earlier metrics are dropped with the partial store.
pub fn generate_metrics(
    table: &Table,
    instructions: &MetricInstructions,
    registry: Option<&MethodRegistry>,
) -> MetricsResult<MetricsStore> {
    let registry = registry.unwrap_or_else(|| default_registry());
    log::debug!(
        "processing {} metric(s) on a table with {} rows",
        instructions.len(),
        table.row_count()
    );
    if table.is_empty() {
        log::warn!("input table is empty");
    }

    let mut store = MetricsStore::new();
    let global_split = instructions.split_by.as_deref();
    for metric in &instructions.metrics {
        evaluate_metric(table, metric, global_split, registry, &mut store)?;
    }

    log::debug!("generated {} result(s)", store.len());
    Ok(store)
}

fn evaluate_metric(
    table: &Table,
    metric: &MetricConfig,
    global_split: Option<&[String]>,
    registry: &MethodRegistry,
    store: &mut MetricsStore,
) -> MetricsResult<()> {
    let name = metric.name.as_str();
    let methods = resolve_methods(&metric.methods, registry)?;

    let subset = apply_filter(table, &metric.filter);
    log::trace!("metric '{name}': filtered to {} rows", subset.row_count());

    let results = match metric.effective_split(global_split) {
        Some(split_columns) => {
            log::debug!("metric '{name}': splitting by {split_columns:?}");
            let results = split_and_combine(&subset, split_columns, &methods, name)?;
            if subset.is_empty() {
                log::warn!("metric '{name}': no rows left after filtering; split produced no results");
            }
            results
        }
        None => apply_methods(&subset, &methods, name)?,
    };

    store.extend(results);
    Ok(())
}

/// Parse `instructions` from a JSON document and evaluate them.
pub fn generate_metrics_from_json(
    table: &Table,
    instructions: &serde_json::Value,
    registry: Option<&MethodRegistry>,
) -> MetricsResult<MetricsStore> {
    let instructions = MetricInstructions::from_json(instructions)?;
    generate_metrics(table, &instructions, registry)
}

/// Read the `metric_instructions` section of the YAML file at `path` and evaluate it.
pub fn generate_metrics_from_path(
    table: &Table,
    path: impl AsRef<Path>,
    registry: Option<&MethodRegistry>,
) -> MetricsResult<MetricsStore> {
    let instructions = read_metric_instructions(path)?;
    generate_metrics(table, &instructions, registry)
}
