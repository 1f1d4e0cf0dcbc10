//! Row filtering driven by nested filter specifications.
//!
//! A filter specification is a mapping over the alphabet `{and, or, not, <column>}`:
//!
//! ```yaml
//! filter:
//!   and:
//!     category: [A, B]             # membership
//!     value: {greater than: 15}    # comparison
//!     not: {status: closed}        # nested negation
//!   or:
//!     - region: north
//!     - priority: {is: high}
//! ```
//!
//! The raw document is parsed once into a [`FilterExpr`] tree and then evaluated by structural
//! recursion into a [`RowMask`]. A condition on a column that does not exist in the table selects
//! no rows instead of failing, so one configuration can be shared across datasets that only
//! carry some of the referenced columns. Negation applies on top of that: `{col: {not: ...}}`
//! on a missing column selects every row, the same as `{not: {col: ...}}`.

use crate::error::{MetricsError, MetricsResult};
use crate::mask::RowMask;
use crate::table::Table;
use crate::value::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
}

impl CompareOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Less => ord == Ordering::Less,
            CompareOp::LessEquals => ord != Ordering::Greater,
            CompareOp::Greater => ord == Ordering::Greater,
            CompareOp::GreaterEquals => ord != Ordering::Less,
        }
    }
}

/// A predicate on a single column.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Equals(Value),
    /// `{is: v}`; same semantics as [`Condition::Equals`], kept distinct to mirror the config.
    Is(Value),
    Compare(CompareOp, Value),
    In(HashSet<Value>),
    NotIn(HashSet<Value>),
    Not(Box<Condition>),
}

impl Condition {
    /// Whether the condition holds on a column the table does not have.
    ///
    /// A missing column selects nothing; each leaf `not` flips that.
    pub fn matches_missing(&self) -> bool {
        match self {
            Condition::Not(inner) => !inner.matches_missing(),
            _ => false,
        }
    }

    pub fn matches(&self, cell: &Value) -> bool {
        match self {
            Condition::Equals(v) | Condition::Is(v) => cell == v,
            Condition::Compare(op, v) => cell
                .partial_compare(v)
                .map(|ord| op.holds(ord))
                .unwrap_or(false),
            Condition::In(values) => values.contains(cell),
            Condition::NotIn(values) => !values.contains(cell),
            Condition::Not(inner) => !inner.matches(cell),
        }
    }
}

/// Parsed filter tree.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpr {
    /// Empty or absent specification: selects every row.
    All,
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
    Column { column: String, condition: Condition },
}

impl FilterExpr {
    pub fn parse(spec: &serde_json::Value) -> MetricsResult<FilterExpr> {
        let map = match spec {
            serde_json::Value::Null => return Ok(FilterExpr::All),
            serde_json::Value::Object(map) => map,
            other => {
                return Err(MetricsError::specification(
                    "filter must be a mapping",
                    other,
                ))
            }
        };

        let mut nodes = map
            .iter()
            .map(|(key, value)| parse_entry(key, value))
            .collect::<MetricsResult<Vec<_>>>()?;

        Ok(match nodes.len() {
            0 => FilterExpr::All,
            1 => nodes.remove(0),
            _ => FilterExpr::And(nodes),
        })
    }

    pub fn is_all(&self) -> bool {
        matches!(self, FilterExpr::All)
    }

    pub fn evaluate(&self, table: &Table) -> RowMask {
        let rows = table.row_count();
        match self {
            FilterExpr::All => RowMask::all_true(rows),
            FilterExpr::And(nodes) => {
                let mut mask = RowMask::all_true(rows);
                for node in nodes {
                    mask.and_inplace(&node.evaluate(table));
                }
                mask
            }
            FilterExpr::Or(nodes) => {
                let mut mask = RowMask::all_false(rows);
                for node in nodes {
                    mask.or_inplace(&node.evaluate(table));
                }
                mask
            }
            FilterExpr::Not(inner) => {
                let mut mask = inner.evaluate(table);
                mask.not_inplace();
                mask
            }
            FilterExpr::Column { column, condition } => {
                let Some(idx) = table.column_idx(column) else {
                    let selected = condition.matches_missing();
                    log::trace!("filter column '{column}' not present; condition selects all rows: {selected}");
                    return if selected {
                        RowMask::all_true(rows)
                    } else {
                        RowMask::all_false(rows)
                    };
                };
                RowMask::from_fn(rows, |row| {
                    table
                        .value_by_idx(row, idx)
                        .is_some_and(|cell| condition.matches(cell))
                })
            }
        }
    }
}

fn parse_entry(key: &str, value: &serde_json::Value) -> MetricsResult<FilterExpr> {
    match key {
        "and" => {
            let serde_json::Value::Object(map) = value else {
                return Err(MetricsError::specification(
                    "'and' expects a mapping of conditions",
                    value,
                ));
            };
            Ok(FilterExpr::And(parse_entries(map)?))
        }
        "or" => match value {
            serde_json::Value::Object(map) => Ok(FilterExpr::Or(parse_entries(map)?)),
            serde_json::Value::Array(items) => Ok(FilterExpr::Or(
                items
                    .iter()
                    .map(FilterExpr::parse)
                    .collect::<MetricsResult<Vec<_>>>()?,
            )),
            other => Err(MetricsError::specification(
                "'or' expects a mapping or a list of conditions",
                other,
            )),
        },
        "not" => Ok(FilterExpr::Not(Box::new(FilterExpr::parse(value)?))),
        column => Ok(FilterExpr::Column {
            column: column.to_string(),
            condition: parse_condition(column, value)?,
        }),
    }
}

fn parse_entries(map: &serde_json::Map<String, serde_json::Value>) -> MetricsResult<Vec<FilterExpr>> {
    // Nested `and`/`or`/`not` keys recurse as sub-specifications; anything else is a column.
    map.iter()
        .map(|(key, value)| parse_entry(key, value))
        .collect()
}

fn parse_condition(column: &str, value: &serde_json::Value) -> MetricsResult<Condition> {
    match value {
        serde_json::Value::Object(ops) => {
            // `not` wins over any sibling operator and negates its own nested condition.
            if let Some(inner) = ops.get("not") {
                return Ok(Condition::Not(Box::new(parse_condition(column, inner)?)));
            }
            if let Some(v) = ops.get("less than") {
                return Ok(Condition::Compare(CompareOp::Less, scalar_operand(column, v)?));
            }
            if let Some(v) = ops.get("less than equal") {
                return Ok(Condition::Compare(CompareOp::LessEquals, scalar_operand(column, v)?));
            }
            if let Some(v) = ops.get("greater than") {
                return Ok(Condition::Compare(CompareOp::Greater, scalar_operand(column, v)?));
            }
            if let Some(v) = ops.get("greater than equal") {
                return Ok(Condition::Compare(
                    CompareOp::GreaterEquals,
                    scalar_operand(column, v)?,
                ));
            }
            if let Some(v) = ops.get("is") {
                return Ok(Condition::Is(scalar_operand(column, v)?));
            }
            if let Some(v) = ops.get("in") {
                return Ok(Condition::In(list_operand(column, "in", v)?));
            }
            if let Some(v) = ops.get("not in") {
                return Ok(Condition::NotIn(list_operand(column, "not in", v)?));
            }
            let keys: Vec<&str> = ops.keys().map(String::as_str).collect();
            Err(MetricsError::specification(
                format!("unknown filter operator(s) {keys:?} for column '{column}'"),
                value,
            ))
        }
        serde_json::Value::Array(_) => Ok(Condition::In(list_operand(column, "membership", value)?)),
        scalar => Ok(Condition::Equals(scalar_operand(column, scalar)?)),
    }
}

fn scalar_operand(column: &str, value: &serde_json::Value) -> MetricsResult<Value> {
    Value::from_json(value).ok_or_else(|| {
        MetricsError::specification(
            format!("filter on column '{column}' expects a scalar operand"),
            value,
        )
    })
}

fn list_operand(
    column: &str,
    operator: &str,
    value: &serde_json::Value,
) -> MetricsResult<HashSet<Value>> {
    let serde_json::Value::Array(items) = value else {
        return Err(MetricsError::specification(
            format!("'{operator}' filter on column '{column}' expects a list"),
            value,
        ));
    };
    items.iter().map(|item| scalar_operand(column, item)).collect()
}

/// Evaluate `filter` against `table` and return the row mask.
pub fn evaluate(table: &Table, filter: &FilterExpr) -> RowMask {
    filter.evaluate(table)
}

/// Apply `filter` to `table`.
///
/// An empty filter returns the input table borrowed, without copying it.
pub fn apply_filter<'a>(table: &'a Table, filter: &FilterExpr) -> Cow<'a, Table> {
    if filter.is_all() {
        log::trace!("no filter specified, using all {} rows", table.row_count());
        return Cow::Borrowed(table);
    }

    let mask = filter.evaluate(table);
    log::trace!(
        "filter selected {} of {} rows",
        mask.count_ones(),
        table.row_count()
    );
    Cow::Owned(table.select(&mask))
}
