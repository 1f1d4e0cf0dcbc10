//! Split-by processing and dimensional promotion.
//!
//! A split partitions the (already filtered) table by the unique combinations of the split
//! columns, runs every method once per group and stitches the per-group results back together.
//! Each split column becomes one more dimension on the combined result:
//!
//! | per-group result | 1 split column            | N split columns                 |
//! |------------------|---------------------------|---------------------------------|
//! | scalar           | vector over the column    | table: splits + `value`         |
//! | vector           | table: split + dim + `value` | table: splits + dim + `value` |
//! | table            | table: columns + split    | table: columns + splits         |
//!
//! Groups come out in ascending key order, compared column by column, with blank keys after
//! every non-blank value.

use crate::error::{MetricsError, MetricsResult};
use crate::invoke::{apply_methods, MethodSpec};
use crate::registry::MetricMethod;
use crate::result::{
    ResultData, ResultTable, TypedResult, ValueType, DEFAULT_DIMENSION, DEFAULT_VALUE_COLUMN,
};
use crate::table::Table;
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Normalize a raw `split_by` entry into a list of column names.
///
/// `null` and `[]` mean "no split" and yield `None`; a string is a single column.
pub fn normalize_split_by(raw: &serde_json::Value) -> MetricsResult<Option<Vec<String>>> {
    match raw {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(column) => Ok(Some(vec![column.clone()])),
        serde_json::Value::Array(items) => {
            let columns = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        MetricsError::specification("split_by list must contain only strings", raw)
                    })
                })
                .collect::<MetricsResult<Vec<_>>>()?;
            Ok((!columns.is_empty()).then_some(columns))
        }
        other => Err(MetricsError::specification(
            "split_by must be a string, a list of strings or null",
            other,
        )),
    }
}

pub fn validate_split_columns(table: &Table, split_columns: &[String], metric: &str) -> MetricsResult<()> {
    let missing: Vec<String> = split_columns
        .iter()
        .filter(|c| !table.has_column(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(MetricsError::MissingSplitColumns {
            metric: metric.to_string(),
            missing,
        });
    }
    Ok(())
}

fn cmp_split_value(a: &Value, b: &Value) -> Ordering {
    match (a.is_blank(), b.is_blank()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

fn cmp_split_key(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| cmp_split_value(x, y))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Row indices per observed split key, in ascending key order with blanks last.
fn partition(table: &Table, split_idx: &[usize]) -> Vec<(Vec<Value>, Vec<usize>)> {
    let mut groups: BTreeMap<Vec<Value>, Vec<usize>> = BTreeMap::new();
    for (row_idx, row) in table.rows().enumerate() {
        let key = split_idx.iter().map(|&idx| row[idx].clone()).collect();
        groups.entry(key).or_default().push(row_idx);
    }
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|(a, _), (b, _)| cmp_split_key(a, b));
    groups
}

/// Run `methods` once per split group of `table` and combine the results per method.
pub fn split_and_combine(
    table: &Table,
    split_columns: &[String],
    methods: &[(MethodSpec, Arc<MetricMethod>)],
    metric: &str,
) -> MetricsResult<Vec<TypedResult>> {
    validate_split_columns(table, split_columns, metric)?;

    let split_idx: Vec<usize> = split_columns
        .iter()
        .filter_map(|c| table.column_idx(c))
        .collect();

    let all_blank: Vec<&str> = split_columns
        .iter()
        .zip(&split_idx)
        .filter(|&(_, &idx)| !table.is_empty() && table.rows().all(|row| row[idx].is_blank()))
        .map(|(c, _)| c.as_str())
        .collect();
    if !all_blank.is_empty() {
        log::warn!("metric '{metric}': split columns contain only blank values: {all_blank:?}");
    }

    let groups = partition(table, &split_idx);
    log::debug!(
        "metric '{metric}': {} group(s) from {} split column(s)",
        groups.len(),
        split_columns.len()
    );

    let mut per_method: Vec<Vec<(Vec<Value>, TypedResult)>> = vec![Vec::new(); methods.len()];
    for (key, rows) in groups {
        let subset = table.select_rows(rows);
        log::trace!("metric '{metric}': split {key:?} ({} rows)", subset.row_count());
        let results = apply_methods(&subset, methods, metric)?;
        for (slot, result) in per_method.iter_mut().zip(results) {
            slot.push((key.clone(), result));
        }
    }

    per_method
        .into_iter()
        .filter(|groups| !groups.is_empty())
        .map(|groups| {
            let method = groups[0].1.method.clone();
            combine_split_results(groups, split_columns, metric, &method)
        })
        .collect()
}

/// Merge per-group results of one method into a single result with the split columns as extra
/// dimensions.
pub fn combine_split_results(
    groups: Vec<(Vec<Value>, TypedResult)>,
    split_columns: &[String],
    metric: &str,
    method: &str,
) -> MetricsResult<TypedResult> {
    let kinds: BTreeSet<ValueType> = groups.iter().map(|(_, r)| r.value_type()).collect();
    if kinds.len() > 1 {
        return Err(MetricsError::MixedSplitResults {
            metric: metric.to_string(),
            method: method.to_string(),
            found: kinds.into_iter().collect(),
        });
    }

    // Vectors must share their dimension name and tables their value column.
    let names: BTreeSet<&str> = groups
        .iter()
        .filter_map(|(_, r)| match &r.data {
            ResultData::Vector { dimension, .. } => Some(dimension.as_str()),
            ResultData::Table(table) => Some(table.value_column()),
            ResultData::Scalar(_) => None,
        })
        .collect();
    if names.len() > 1 {
        let what = match kinds.first() {
            Some(ValueType::Table) => "value columns",
            _ => "dimension names",
        };
        return Err(MetricsError::InconsistentSplitResults {
            metric: metric.to_string(),
            method: method.to_string(),
            what,
            found: names.into_iter().map(str::to_string).collect(),
        });
    }

    let data = match kinds.into_iter().next() {
        None => ResultData::Scalar(Value::Blank),
        Some(ValueType::Scalar) => combine_scalars(groups, split_columns)?,
        Some(ValueType::Vector) => combine_vectors(groups, split_columns)?,
        Some(ValueType::Table) => combine_tables(groups, split_columns)?,
    };
    Ok(TypedResult::new(metric, method, data))
}

fn combine_scalars(
    groups: Vec<(Vec<Value>, TypedResult)>,
    split_columns: &[String],
) -> MetricsResult<ResultData> {
    let values = groups.into_iter().map(|(key, result)| {
        let value = match result.data {
            ResultData::Scalar(v) => v,
            _ => Value::Blank,
        };
        (key, value)
    });

    if let [column] = split_columns {
        let entries = values
            .map(|(mut key, value)| (key.pop().unwrap_or_default(), value))
            .collect::<Vec<_>>();
        return Ok(ResultData::vector(column.clone(), entries));
    }

    let mut columns = split_columns.to_vec();
    columns.push(DEFAULT_VALUE_COLUMN.to_string());
    let rows = values
        .map(|(mut key, value)| {
            key.push(value);
            key
        })
        .collect();
    ResultData::from_parts(columns, rows, Some(DEFAULT_VALUE_COLUMN))
}

fn combine_vectors(
    groups: Vec<(Vec<Value>, TypedResult)>,
    split_columns: &[String],
) -> MetricsResult<ResultData> {
    let mut dimension = None;
    let mut rows = Vec::new();
    for (key, result) in groups {
        let ResultData::Vector {
            dimension: dim,
            entries,
        } = result.data
        else {
            continue;
        };
        dimension.get_or_insert(dim);
        for (entry_key, value) in entries {
            let mut row = key.clone();
            row.push(entry_key);
            row.push(value);
            rows.push(row);
        }
    }

    let mut columns = split_columns.to_vec();
    columns.push(dimension.unwrap_or_else(|| DEFAULT_DIMENSION.to_string()));
    columns.push(DEFAULT_VALUE_COLUMN.to_string());
    ResultData::from_parts(columns, rows, Some(DEFAULT_VALUE_COLUMN))
}

fn combine_tables(
    groups: Vec<(Vec<Value>, TypedResult)>,
    split_columns: &[String],
) -> MetricsResult<ResultData> {
    let tables: Vec<(Vec<Value>, ResultTable)> = groups
        .into_iter()
        .filter_map(|(key, result)| match result.data {
            ResultData::Table(table) => Some((key, table)),
            _ => None,
        })
        .collect();

    let value_column = tables
        .first()
        .map(|(_, t)| t.value_column().to_string())
        .unwrap_or_else(|| DEFAULT_VALUE_COLUMN.to_string());

    // Column union in first-seen order; split columns go last and win over same-named columns.
    let mut columns: Vec<String> = Vec::new();
    for (_, table) in &tables {
        for column in table.columns() {
            if !columns.contains(column) && !split_columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }
    let data_width = columns.len();
    columns.extend(split_columns.iter().cloned());

    let mut rows = Vec::new();
    for (key, table) in &tables {
        let positions: Vec<Option<usize>> = columns[..data_width]
            .iter()
            .map(|c| table.column_idx(c))
            .collect();
        for row in table.rows() {
            let mut out: Vec<Value> = positions
                .iter()
                .map(|pos| pos.map(|idx| row[idx].clone()).unwrap_or_default())
                .collect();
            out.extend(key.iter().cloned());
            rows.push(out);
        }
    }

    ResultData::from_parts(columns, rows, Some(&value_column))
}
