//! Dimension-indexed storage for computed metric results.
//!
//! Results are keyed by `(metric, method)`. Alongside the primary map the store keeps an inverted
//! index from `(dimension name, dimension value)` to the keys of every result that has at least one
//! data point with that coordinate, so dimension queries only touch the matching results.

use crate::error::{MetricsError, MetricsResult};
use crate::result::{create_result, MethodOutput, Record, ResultData, TypedResult, ValueType};
use crate::table::Table;
use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey {
    pub metric: String,
    pub method: String,
}

impl ResultKey {
    pub fn new(metric: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            method: method.into(),
        }
    }

    fn of(result: &TypedResult) -> Self {
        Self::new(result.metric.clone(), result.method.clone())
    }
}

/// Criteria for [`MetricsStore::filter`].
///
/// Each list is any-of; an empty list does not constrain. Dimension pairs must all match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreQuery {
    pub metrics: Vec<String>,
    pub methods: Vec<String>,
    pub value_types: Vec<ValueType>,
    pub dimensions: Vec<(String, Value)>,
}

impl StoreQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metrics.push(metric.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(method.into());
        self
    }

    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_types.push(value_type);
        self
    }

    pub fn dimension(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.dimensions.push((name.into(), value.into()));
        self
    }

    fn accepts(&self, result: &TypedResult) -> bool {
        (self.metrics.is_empty() || self.metrics.contains(&result.metric))
            && (self.methods.is_empty() || self.methods.contains(&result.method))
            && (self.value_types.is_empty() || self.value_types.contains(&result.value_type()))
    }
}

/// One line of [`MetricsStore::summary`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub metric: String,
    pub method: String,
    pub value_type: ValueType,
    pub dimensions: Vec<String>,
    pub n_dimensions: usize,
}

#[derive(Clone, Debug, Default)]
pub struct MetricsStore {
    results: HashMap<ResultKey, TypedResult>,
    order: Vec<ResultKey>,
    positions: HashMap<ResultKey, usize>,
    dimension_index: HashMap<(String, Value), HashSet<ResultKey>>,
}

impl PartialEq for MetricsStore {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order && self.results == other.results
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `result`, replacing any result already stored under the same `(metric, method)`.
    pub fn add(&mut self, result: TypedResult) {
        let key = ResultKey::of(&result);
        if let Some(previous) = self.results.remove(&key) {
            log::debug!(
                "replacing stored result for metric '{}', method '{}'",
                key.metric,
                key.method
            );
            self.unindex(&key, &previous);
        } else {
            self.positions.insert(key.clone(), self.order.len());
            self.order.push(key.clone());
        }

        for record in result.to_records() {
            for (name, value) in record.dimensions {
                self.dimension_index
                    .entry((name, value))
                    .or_default()
                    .insert(key.clone());
            }
        }
        self.results.insert(key, result);
    }

    /// Normalize raw method output with [`create_result`] and insert it.
    pub fn add_from_output(
        &mut self,
        metric: &str,
        method: &str,
        output: MethodOutput,
        value_column: Option<&str>,
    ) -> MetricsResult<&TypedResult> {
        let result = create_result(metric, method, output, value_column)?;
        let key = ResultKey::of(&result);
        self.add(result);
        self.result_by_key(&key)
    }

    fn unindex(&mut self, key: &ResultKey, previous: &TypedResult) {
        for record in previous.to_records() {
            for coordinate in record.dimensions {
                if let Some(keys) = self.dimension_index.get_mut(&coordinate) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.dimension_index.remove(&coordinate);
                    }
                }
            }
        }
    }

    fn result_by_key(&self, key: &ResultKey) -> MetricsResult<&TypedResult> {
        self.results
            .get(key)
            .ok_or_else(|| MetricsError::ResultNotFound {
                metric: key.metric.clone(),
                method: key.method.clone(),
            })
    }

    pub fn get(&self, metric: &str, method: &str) -> Option<&TypedResult> {
        self.results.get(&ResultKey::new(metric, method))
    }

    /// Like [`MetricsStore::get`], but a missing result is an error.
    pub fn result(&self, metric: &str, method: &str) -> MetricsResult<&TypedResult> {
        self.result_by_key(&ResultKey::new(metric, method))
    }

    pub fn value(&self, metric: &str, method: &str) -> MetricsResult<&ResultData> {
        self.result(metric, method).map(|r| &r.data)
    }

    pub fn contains(&self, metric: &str, method: &str) -> bool {
        self.results.contains_key(&ResultKey::new(metric, method))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &ResultKey> + '_ {
        self.order.iter()
    }

    /// Results in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &TypedResult> + '_ {
        self.order.iter().filter_map(|key| self.results.get(key))
    }

    pub fn scalars(&self) -> impl Iterator<Item = &TypedResult> + '_ {
        self.all().filter(|r| r.value_type() == ValueType::Scalar)
    }

    pub fn vectors(&self) -> impl Iterator<Item = &TypedResult> + '_ {
        self.all().filter(|r| r.value_type() == ValueType::Vector)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TypedResult> + '_ {
        self.all().filter(|r| r.value_type() == ValueType::Table)
    }

    /// Distinct metric names, sorted.
    pub fn metrics(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|k| k.metric.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct method names, sorted; restricted to one metric when `metric` is given.
    pub fn methods(&self, metric: Option<&str>) -> Vec<String> {
        self.order
            .iter()
            .filter(|k| metric.map_or(true, |m| k.metric == m))
            .map(|k| k.method.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// A new store holding the results that satisfy `query`.
    ///
    /// Dimension criteria are resolved through the index first, so only results carrying every
    /// requested coordinate are visited.
    pub fn filter(&self, query: &StoreQuery) -> MetricsStore {
        let mut filtered = MetricsStore::new();
        let keys: Vec<&ResultKey> = match self.candidate_keys(&query.dimensions) {
            Some(candidates) => candidates,
            None => self.order.iter().collect(),
        };
        for key in keys {
            if let Some(result) = self.results.get(key) {
                if query.accepts(result) {
                    filtered.add(result.clone());
                }
            }
        }
        filtered
    }

    /// Keys holding every coordinate in `dimensions`, in insertion order; `None` when there are
    /// no dimension criteria.
    fn candidate_keys(&self, dimensions: &[(String, Value)]) -> Option<Vec<&ResultKey>> {
        let (first, rest) = dimensions.split_first()?;
        let mut candidates: Vec<&ResultKey> = match self.dimension_index.get(first) {
            Some(keys) => keys.iter().collect(),
            None => return Some(Vec::new()),
        };
        for coordinate in rest {
            let Some(keys) = self.dimension_index.get(coordinate) else {
                return Some(Vec::new());
            };
            candidates.retain(|key| keys.contains(*key));
        }
        candidates.sort_by_key(|key| self.positions.get(*key).copied().unwrap_or(usize::MAX));
        Some(candidates)
    }

    pub fn by_metric(&self, metric: &str) -> MetricsStore {
        self.filter(&StoreQuery::new().metric(metric))
    }

    pub fn by_method(&self, method: &str) -> MetricsStore {
        self.filter(&StoreQuery::new().method(method))
    }

    pub fn by_dimension(&self, name: &str, value: impl Into<Value>) -> MetricsStore {
        self.filter(&StoreQuery::new().dimension(name, value))
    }

    /// Every data point of every result, in insertion order.
    pub fn to_records(&self) -> Vec<Record> {
        self.all().flat_map(TypedResult::to_records).collect()
    }

    /// Flat JSON objects, one per data point.
    ///
    /// With `include_metadata`, each object also carries `value_type`, `dimensions` and
    /// `n_dimensions` of the result it came from.
    pub fn to_json_records(&self, include_metadata: bool) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        for result in self.all() {
            let dimensions = result.dimensions();
            for record in result.to_records() {
                let mut json = match serde_json::to_value(&record) {
                    Ok(serde_json::Value::Object(map)) => map,
                    _ => continue,
                };
                if include_metadata {
                    json.insert("value_type".into(), result.value_type().as_str().into());
                    json.insert("dimensions".into(), dimensions.clone().into());
                    json.insert("n_dimensions".into(), dimensions.len().into());
                }
                out.push(serde_json::Value::Object(json));
            }
        }
        out
    }

    /// `{metric: {method: data}}`.
    pub fn to_nested_json(&self) -> serde_json::Value {
        let mut nested = serde_json::Map::new();
        for result in self.all() {
            if let serde_json::Value::Object(methods) = nested
                .entry(result.metric.clone())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()))
            {
                methods.insert(result.method.clone(), result.data.to_json());
            }
        }
        serde_json::Value::Object(nested)
    }

    /// `{method: {metric: data}}`, for comparing one method across metrics.
    pub fn to_nested_json_by_method(&self) -> serde_json::Value {
        let mut nested = serde_json::Map::new();
        for result in self.all() {
            if let serde_json::Value::Object(metrics) = nested
                .entry(result.method.clone())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()))
            {
                metrics.insert(result.metric.clone(), result.data.to_json());
            }
        }
        serde_json::Value::Object(nested)
    }

    pub fn summary(&self) -> Vec<ResultSummary> {
        self.all()
            .map(|result| {
                let dimensions = result.dimensions();
                ResultSummary {
                    metric: result.metric.clone(),
                    method: result.method.clone(),
                    value_type: result.value_type(),
                    n_dimensions: dimensions.len(),
                    dimensions,
                }
            })
            .collect()
    }

    /// One tidy table: `metric`, `method`, the union of all dimension columns (first-seen order,
    /// blank where a result lacks the dimension), then `value`.
    pub fn to_table(&self) -> MetricsResult<Table> {
        let records = self.to_records();

        let mut dimension_columns: Vec<String> = Vec::new();
        for record in &records {
            for (name, _) in &record.dimensions {
                if !dimension_columns.contains(name) {
                    dimension_columns.push(name.clone());
                }
            }
        }

        let mut columns = vec!["metric".to_string(), "method".to_string()];
        columns.extend(dimension_columns.iter().cloned());
        columns.push("value".to_string());

        let mut table = Table::new(columns);
        for record in records {
            let mut row = Vec::with_capacity(dimension_columns.len() + 3);
            row.push(Value::from(record.metric.as_str()));
            row.push(Value::from(record.method.as_str()));
            for column in &dimension_columns {
                row.push(record.dimension(column).cloned().unwrap_or_default());
            }
            row.push(record.value);
            table.push_row(row)?;
        }
        Ok(table)
    }
}

impl Extend<TypedResult> for MetricsStore {
    fn extend<I: IntoIterator<Item = TypedResult>>(&mut self, iter: I) {
        for result in iter {
            self.add(result);
        }
    }
}

impl FromIterator<TypedResult> for MetricsStore {
    fn from_iter<I: IntoIterator<Item = TypedResult>>(iter: I) -> Self {
        let mut store = MetricsStore::new();
        store.extend(iter);
        store
    }
}
