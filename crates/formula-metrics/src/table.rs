use crate::error::{MetricsError, MetricsResult};
use crate::mask::RowMask;
use crate::value::Value;
use std::collections::HashMap;

/// Row-oriented table: the dataset metrics are computed over, and the 2-D payload methods may
/// return.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<impl Into<String>>) -> Self {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let column_index = columns
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.clone(), idx))
            .collect();

        Self {
            columns,
            column_index,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(
        columns: Vec<impl Into<String>>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> MetricsResult<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> MetricsResult<()> {
        if row.len() != self.columns.len() {
            return Err(MetricsError::SchemaMismatch {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }

        self.rows.push(row);
        Ok(())
    }

    pub fn column_idx(&self, column: &str) -> Option<usize> {
        self.column_index.get(column).copied()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index.contains_key(column)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_idx(column)?;
        self.rows.get(row)?.get(idx)
    }

    pub fn value_by_idx(&self, row: usize, idx: usize) -> Option<&Value> {
        self.rows.get(row)?.get(idx)
    }

    pub fn row(&self, row: usize) -> Option<&[Value]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> + '_ {
        self.rows.iter().map(Vec::as_slice)
    }

    /// All values of one column, top to bottom.
    pub fn column_values<'a>(&'a self, column: &str) -> Option<impl Iterator<Item = &'a Value> + 'a> {
        let idx = self.column_idx(column)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Keep the rows whose bit is set in `mask`.
    pub fn select(&self, mask: &RowMask) -> Table {
        debug_assert_eq!(mask.len(), self.rows.len(), "mask/table length mismatch");
        self.select_rows(mask.iter_ones())
    }

    pub fn select_rows(&self, rows: impl IntoIterator<Item = usize>) -> Table {
        Table {
            columns: self.columns.clone(),
            column_index: self.column_index.clone(),
            rows: rows
                .into_iter()
                .filter_map(|row| self.rows.get(row).cloned())
                .collect(),
        }
    }

    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> MetricsResult<()> {
        let name = name.into();
        if self.column_index.contains_key(&name) {
            return Err(MetricsError::DuplicateColumn { column: name });
        }
        if values.len() != self.rows.len() {
            return Err(MetricsError::SchemaMismatch {
                expected: self.rows.len(),
                actual: values.len(),
            });
        }

        let idx = self.columns.len();
        self.columns.push(name.clone());
        self.column_index.insert(name, idx);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }
}
