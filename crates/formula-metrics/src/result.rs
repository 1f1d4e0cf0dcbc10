//! Typed metric results.
//!
//! Every method invocation is normalized into a [`TypedResult`] whose payload carries its own
//! dimensional structure:
//! - [`ResultData::Scalar`]: no dimensions
//! - [`ResultData::Vector`]: one dimension (the entry keys)
//! - [`ResultData::Table`]: N dimensions (every column except the value column)
//!
//! [`create_result`] is the single place where raw method output is inspected and turned into one
//! of these variants.

use crate::error::{MetricsError, MetricsResult};
use crate::table::Table;
use crate::value::Value;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Dimension name used when a 1-D result carries no label of its own.
pub const DEFAULT_DIMENSION: &str = "index";

/// Value column name used for tables assembled by the split engine.
pub const DEFAULT_VALUE_COLUMN: &str = "value";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Scalar,
    Vector,
    Table,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Scalar => "scalar",
            ValueType::Vector => "vector",
            ValueType::Table => "table",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A 1-D labeled sequence: ordered `(key, value)` pairs plus an optional index name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series {
    pub index_name: Option<String>,
    pub entries: Vec<(Value, Value)>,
}

impl Series {
    pub fn new(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self {
            index_name: None,
            entries: entries.into_iter().collect(),
        }
    }

    pub fn named(index_name: impl Into<String>, entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Self {
            index_name: Some(index_name.into()),
            entries: entries.into_iter().collect(),
        }
    }
}

/// Tabular payload with at least one dimension column and exactly one value column.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    value_idx: usize,
}

impl ResultTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn value_column(&self) -> &str {
        &self.columns[self.value_idx]
    }

    pub fn dimensions(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != self.value_idx)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn column_idx(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, column: &str) -> MetricsResult<Vec<Value>> {
        let idx = self
            .column_idx(column)
            .ok_or_else(|| MetricsError::UnknownColumn {
                column: column.to_string(),
            })?;
        Ok(self.rows.iter().map(|row| row[idx].clone()).collect())
    }

    /// Look up the value for one combination of dimension values, given in dimension order.
    pub fn lookup(&self, key: &[Value]) -> Option<&Value> {
        self.rows
            .iter()
            .find(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(idx, _)| *idx != self.value_idx)
                    .map(|(_, v)| v)
                    .eq(key.iter())
            })
            .map(|row| &row[self.value_idx])
    }

    fn records(&self) -> impl Iterator<Item = (Vec<(String, Value)>, Value)> + '_ {
        self.rows.iter().map(move |row| {
            let dims = self
                .columns
                .iter()
                .zip(row.iter())
                .enumerate()
                .filter(|(idx, _)| *idx != self.value_idx)
                .map(|(_, (c, v))| (c.clone(), v.clone()))
                .collect();
            (dims, row[self.value_idx].clone())
        })
    }
}

/// Payload of a [`TypedResult`].
#[derive(Clone, Debug, PartialEq)]
pub enum ResultData {
    Scalar(Value),
    Vector {
        dimension: String,
        entries: Vec<(Value, Value)>,
    },
    Table(ResultTable),
}

impl ResultData {
    pub fn vector(dimension: impl Into<String>, entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        ResultData::Vector {
            dimension: dimension.into(),
            entries: entries.into_iter().collect(),
        }
    }

    pub fn from_series(series: Series) -> Self {
        ResultData::Vector {
            dimension: series
                .index_name
                .unwrap_or_else(|| DEFAULT_DIMENSION.to_string()),
            entries: series.entries,
        }
    }

    /// Build a tabular payload, degenerating to a lower dimensionality when `table` has no
    /// dimension columns.
    ///
    /// `value_column` defaults to the last column. A table holding only its value column becomes
    /// a scalar (zero or one row) or a vector over the implicit row index (several rows).
    pub fn from_table(table: Table, value_column: Option<&str>) -> MetricsResult<Self> {
        let (columns, rows) = table.into_parts();
        Self::from_parts(columns, rows, value_column)
    }

    pub(crate) fn from_parts(
        columns: Vec<String>,
        mut rows: Vec<Vec<Value>>,
        value_column: Option<&str>,
    ) -> MetricsResult<Self> {
        let Some(last) = columns.last() else {
            return Ok(ResultData::Scalar(Value::Blank));
        };
        let value_column = value_column.unwrap_or(last);
        let value_idx = columns
            .iter()
            .position(|c| c == value_column)
            .ok_or_else(|| MetricsError::UnknownColumn {
                column: value_column.to_string(),
            })?;
        for (idx, column) in columns.iter().enumerate() {
            if columns[..idx].contains(column) {
                return Err(MetricsError::DuplicateColumn {
                    column: column.clone(),
                });
            }
        }

        if columns.len() == 1 {
            if rows.len() <= 1 {
                let value = rows
                    .pop()
                    .and_then(|mut row| row.pop())
                    .unwrap_or(Value::Blank);
                return Ok(ResultData::Scalar(value));
            }
            let entries = rows
                .into_iter()
                .enumerate()
                .map(|(idx, mut row)| (Value::from(idx), row.pop().unwrap_or(Value::Blank)))
                .collect::<Vec<_>>();
            return Ok(ResultData::vector(DEFAULT_DIMENSION, entries));
        }

        Ok(ResultData::Table(ResultTable {
            columns,
            rows,
            value_idx,
        }))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ResultData::Scalar(_) => ValueType::Scalar,
            ResultData::Vector { .. } => ValueType::Vector,
            ResultData::Table(_) => ValueType::Table,
        }
    }

    pub fn dimensions(&self) -> Vec<String> {
        match self {
            ResultData::Scalar(_) => Vec::new(),
            ResultData::Vector { dimension, .. } => vec![dimension.clone()],
            ResultData::Table(table) => table.dimensions(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            ResultData::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&ResultTable> {
        match self {
            ResultData::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Value stored under `key` in a vector payload.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            ResultData::Vector { entries, .. } => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// JSON rendering of the payload: a scalar, a `{key: value}` object, or a list of row objects.
    ///
    /// Vector keys become object keys through their display form. When two keys render the same
    /// (`1` and `"1"`, or a blank and `""`) the vector is rendered as a list of `[key, value]`
    /// pairs with typed keys instead, so no entry is lost.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ResultData::Scalar(v) => v.to_json(),
            ResultData::Vector { entries, .. } => {
                let object: serde_json::Map<String, serde_json::Value> = entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect();
                if object.len() == entries.len() {
                    return serde_json::Value::Object(object);
                }
                log::warn!("vector keys collide as JSON object keys; rendering as key/value pairs");
                serde_json::Value::Array(
                    entries
                        .iter()
                        .map(|(k, v)| serde_json::Value::Array(vec![k.to_json(), v.to_json()]))
                        .collect(),
                )
            }
            ResultData::Table(table) => serde_json::Value::Array(
                table
                    .rows
                    .iter()
                    .map(|row| {
                        serde_json::Value::Object(
                            table
                                .columns
                                .iter()
                                .zip(row.iter())
                                .map(|(c, v)| (c.clone(), v.to_json()))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        }
    }
}

/// One flattened data point of a result: identity, zero or more dimension pairs, and the value.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub metric: String,
    pub method: String,
    pub dimensions: Vec<(String, Value)>,
    pub value: Value,
}

impl Record {
    pub fn dimension(&self, name: &str) -> Option<&Value> {
        self.dimensions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.dimensions.len()))?;
        map.serialize_entry("metric", &self.metric)?;
        map.serialize_entry("method", &self.method)?;
        for (name, value) in &self.dimensions {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("value", &self.value)?;
        map.end()
    }
}

/// A metric result: which metric and method produced it, and the typed payload.
#[derive(Clone, Debug, PartialEq)]
pub struct TypedResult {
    pub metric: String,
    pub method: String,
    pub data: ResultData,
}

impl TypedResult {
    pub fn new(metric: impl Into<String>, method: impl Into<String>, data: ResultData) -> Self {
        Self {
            metric: metric.into(),
            method: method.into(),
            data,
        }
    }

    pub fn scalar(metric: impl Into<String>, method: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(metric, method, ResultData::Scalar(value.into()))
    }

    pub fn value_type(&self) -> ValueType {
        self.data.value_type()
    }

    pub fn dimensions(&self) -> Vec<String> {
        self.data.dimensions()
    }

    pub fn to_records(&self) -> Vec<Record> {
        let record = |dimensions: Vec<(String, Value)>, value: Value| Record {
            metric: self.metric.clone(),
            method: self.method.clone(),
            dimensions,
            value,
        };

        match &self.data {
            ResultData::Scalar(v) => vec![record(Vec::new(), v.clone())],
            ResultData::Vector { dimension, entries } => entries
                .iter()
                .map(|(k, v)| record(vec![(dimension.clone(), k.clone())], v.clone()))
                .collect(),
            ResultData::Table(table) => table
                .records()
                .map(|(dims, value)| record(dims, value))
                .collect(),
        }
    }

    pub fn to_json(&self, include_metadata: bool) -> serde_json::Value {
        if !include_metadata {
            return self.data.to_json();
        }
        serde_json::json!({
            "metric": self.metric,
            "method": self.method,
            "value_type": self.value_type(),
            "dimensions": self.dimensions(),
            "data": self.data.to_json(),
        })
    }
}

impl fmt::Display for TypedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.metric, self.method, self.value_type())
    }
}

/// Raw output of a metric method, before normalization by [`create_result`].
#[derive(Clone, Debug, PartialEq)]
pub enum MethodOutput {
    /// Already normalized; passed through unchanged.
    Result(TypedResult),
    /// Keyed wrapper such as `{data: <payload>, value_column: "count"}` or `{value: 3}`.
    Mapping(BTreeMap<String, MethodOutput>),
    Table(Table),
    Series(Series),
    Value(Value),
}

impl MethodOutput {
    /// `{data: <payload>}`, optionally naming the value column of a tabular payload.
    pub fn data(payload: impl Into<MethodOutput>, value_column: Option<&str>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("data".to_string(), payload.into());
        if let Some(column) = value_column {
            map.insert("value_column".to_string(), MethodOutput::from(column));
        }
        MethodOutput::Mapping(map)
    }

    pub fn mapping<K: Into<String>>(entries: impl IntoIterator<Item = (K, MethodOutput)>) -> Self {
        MethodOutput::Mapping(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<TypedResult> for MethodOutput {
    fn from(value: TypedResult) -> Self {
        MethodOutput::Result(value)
    }
}

impl From<Table> for MethodOutput {
    fn from(value: Table) -> Self {
        MethodOutput::Table(value)
    }
}

impl From<Series> for MethodOutput {
    fn from(value: Series) -> Self {
        MethodOutput::Series(value)
    }
}

impl From<Value> for MethodOutput {
    fn from(value: Value) -> Self {
        MethodOutput::Value(value)
    }
}

impl From<f64> for MethodOutput {
    fn from(value: f64) -> Self {
        MethodOutput::Value(value.into())
    }
}

impl From<i64> for MethodOutput {
    fn from(value: i64) -> Self {
        MethodOutput::Value(value.into())
    }
}

impl From<usize> for MethodOutput {
    fn from(value: usize) -> Self {
        MethodOutput::Value(value.into())
    }
}

impl From<bool> for MethodOutput {
    fn from(value: bool) -> Self {
        MethodOutput::Value(value.into())
    }
}

impl From<&str> for MethodOutput {
    fn from(value: &str) -> Self {
        MethodOutput::Value(value.into())
    }
}

impl From<String> for MethodOutput {
    fn from(value: String) -> Self {
        MethodOutput::Value(value.into())
    }
}

/// Normalize raw method output into a [`TypedResult`].
///
/// Inspection order is fixed: existing result, `data` mapping, `value` mapping, other mapping
/// (error), table, series, scalar. A `value_column` embedded next to `data` takes precedence
/// over the one passed in.
pub fn create_result(
    metric: &str,
    method: &str,
    output: MethodOutput,
    value_column: Option<&str>,
) -> MetricsResult<TypedResult> {
    match output {
        MethodOutput::Result(result) => {
            log::trace!("method '{method}' returned a typed result directly");
            Ok(result)
        }
        MethodOutput::Mapping(mut map) => {
            if let Some(data) = map.remove("data") {
                let embedded = match map.remove("value_column") {
                    Some(MethodOutput::Value(Value::Text(column))) => Some(column.to_string()),
                    _ => None,
                };
                if let (Some(embedded), Some(passed)) = (embedded.as_deref(), value_column) {
                    if embedded != passed {
                        log::warn!(
                            "metric '{metric}', method '{method}': value_column '{embedded}' in returned data overrides '{passed}'"
                        );
                    }
                }
                let value_column = embedded.as_deref().or(value_column);
                return create_result(metric, method, data, value_column);
            }

            if let Some(value) = map.remove("value") {
                log::trace!("method '{method}' returned a mapping with 'value'; treating as scalar");
                let value = match value {
                    MethodOutput::Value(v) => v,
                    other => return create_result(metric, method, other, value_column),
                };
                return Ok(TypedResult::scalar(metric, method, value));
            }

            Err(MetricsError::InvalidResultFormat {
                metric: metric.to_string(),
                method: method.to_string(),
                returned_keys: map.into_keys().collect(),
            })
        }
        MethodOutput::Table(table) => {
            if value_column.is_none() {
                log::trace!(
                    "method '{method}' returned a table without value_column; using the last column"
                );
            }
            Ok(TypedResult::new(
                metric,
                method,
                ResultData::from_table(table, value_column)?,
            ))
        }
        MethodOutput::Series(series) => Ok(TypedResult::new(
            metric,
            method,
            ResultData::from_series(series),
        )),
        MethodOutput::Value(value) => Ok(TypedResult::scalar(metric, method, value)),
    }
}
