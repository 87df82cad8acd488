// src/store/record_set.rs

use std::collections::HashMap;
use tracing::debug;

use super::{ColumnDescriptor, ColumnKind, FilterSelection, FilteredView, StoreError, Value};
use crate::load::cell;

/// The full loaded table for a session. Read-only once built.
#[derive(Debug, Clone)]
pub struct RecordSet {
    columns: Vec<ColumnDescriptor>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl RecordSet {
    /// Build from header names and row cells. Rows are padded with `Missing`
    /// (or truncated) to the header width; column kinds are inferred.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = headers.len();
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Value::Missing);
                r
            })
            .collect();

        let mut index = HashMap::with_capacity(width);
        let mut columns = Vec::with_capacity(width);
        for (i, name) in headers.into_iter().enumerate() {
            let kind = ColumnKind::infer(rows.iter().map(|r| &r[i]));
            if index.contains_key(&name) {
                debug!(column = %name, "duplicate column name; lookups resolve to the first");
            } else {
                index.insert(name.clone(), i);
            }
            columns.push(ColumnDescriptor { name, kind });
        }

        Self {
            columns,
            index,
            rows,
        }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&ColumnDescriptor, StoreError> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub(crate) fn column_index(&self, name: &str) -> Result<usize, StoreError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::ColumnNotFound(name.to_string()))
    }

    pub(crate) fn cells(&self, row: usize) -> &[Value] {
        &self.rows[row]
    }

    pub fn row(&self, row: usize) -> Option<Row<'_>> {
        self.rows.get(row).map(|cells| Row { set: self, cells })
    }

    /// Unfiltered view over every row.
    pub fn view(&self) -> FilteredView<'_> {
        FilteredView::new(self, (0..self.rows.len()).collect())
    }

    pub fn apply_filters(&self, selection: &FilterSelection) -> FilteredView<'_> {
        self.view().apply_filters(selection)
    }

    /// Sorted unique non-missing values of `column`.
    pub fn distinct_values(&self, column: &str) -> Result<Vec<Value>, StoreError> {
        self.view().distinct_values(column)
    }

    /// Turn user-typed text into a value of `column`: an existing value with
    /// the same display text wins, then a parse by column kind, then text.
    pub fn resolve_value(&self, column: &str, raw: &str) -> Result<Value, StoreError> {
        let idx = self.column_index(column)?;
        let raw = raw.trim();
        if let Some(found) = self
            .rows
            .iter()
            .map(|r| &r[idx])
            .find(|v| !v.is_missing() && v.to_string() == raw)
        {
            return Ok(found.clone());
        }
        let parsed = match self.columns[idx].kind {
            ColumnKind::Numeric => cell::parse_number(raw).map(Value::number),
            ColumnKind::Date => cell::parse_date(raw).map(Value::Date),
            ColumnKind::Categorical => None,
        };
        Ok(parsed.unwrap_or_else(|| Value::text(raw)))
    }
}

/// One row, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    set: &'a RecordSet,
    cells: &'a [Value],
}

impl<'a> Row<'a> {
    pub(crate) fn new(set: &'a RecordSet, cells: &'a [Value]) -> Self {
        Self { set, cells }
    }

    /// `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.set.index.get(column).map(|&i| &self.cells[i])
    }

    pub fn values(&self) -> &'a [Value] {
        self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        let (set, cells) = (self.set, self.cells);
        set.columns
            .iter()
            .zip(cells.iter())
            .map(|(c, v)| (c.name.as_str(), v))
    }
}
