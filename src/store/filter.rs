// src/store/filter.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::{RecordSet, Row, StoreError, Value};

/// Restriction on a single column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selection {
    /// Explicit "no restriction" sentinel.
    #[default]
    All,
    /// Accepted values. Empty means unrestricted.
    Values { values: BTreeSet<Value> },
    /// Inclusive range; an open side is `None`.
    Range {
        #[serde(default)]
        min: Option<Value>,
        #[serde(default)]
        max: Option<Value>,
    },
}

impl Selection {
    pub fn values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Selection::Values {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Missing bounds are treated as open.
    pub fn range(min: Option<Value>, max: Option<Value>) -> Self {
        Selection::Range {
            min: min.filter(|v| !v.is_missing()),
            max: max.filter(|v| !v.is_missing()),
        }
    }

    /// True for `All`, an empty value set and a range open on both sides.
    pub fn is_unrestricted(&self) -> bool {
        match self {
            Selection::All => true,
            Selection::Values { values } => values.is_empty(),
            Selection::Range { min, max } => open(min).is_none() && open(max).is_none(),
        }
    }

    /// Does `value` pass this selection?
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Selection::All => true,
            Selection::Values { values } => {
                values.is_empty() || (!value.is_missing() && values.contains(value))
            }
            Selection::Range { min, max } => {
                let (min, max) = (open(min), open(max));
                if min.is_none() && max.is_none() {
                    return true;
                }
                if value.is_missing() {
                    return false;
                }
                let above = min.map_or(true, |lo| value.same_kind(lo) && value >= lo);
                let below = max.map_or(true, |hi| value.same_kind(hi) && value <= hi);
                above && below
            }
        }
    }
}

fn open(bound: &Option<Value>) -> Option<&Value> {
    bound.as_ref().filter(|v| !v.is_missing())
}

/// Per-column selections, combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSelection {
    columns: BTreeMap<String, Selection>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, selection: Selection) -> &mut Self {
        self.columns.insert(column.into(), selection);
        self
    }

    pub fn with(mut self, column: impl Into<String>, selection: Selection) -> Self {
        self.set(column, selection);
        self
    }

    /// Back to "all values" for `column`.
    pub fn clear(&mut self, column: &str) {
        self.columns.remove(column);
    }

    pub fn get(&self, column: &str) -> Option<&Selection> {
        self.columns.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_unrestricted(&self) -> bool {
        self.columns.values().all(Selection::is_unrestricted)
    }
}

/// A subset of a record set's rows, in original order. Never owns or
/// mutates the underlying rows.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    pub(super) set: &'a RecordSet,
    pub(super) rows: Vec<usize>,
}

impl<'a> FilteredView<'a> {
    pub(crate) fn new(set: &'a RecordSet, rows: Vec<usize>) -> Self {
        Self { set, rows }
    }

    pub fn record_set(&self) -> &'a RecordSet {
        self.set
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Positions of the retained rows in the record set.
    pub fn row_indices(&self) -> &[usize] {
        &self.rows
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'a>> + '_ {
        let set = self.set;
        self.rows.iter().map(move |&r| Row::new(set, set.cells(r)))
    }

    /// Values of `column` for every row in the view, in view order.
    pub fn column_values(
        &self,
        column: &str,
    ) -> Result<impl Iterator<Item = &'a Value> + '_, StoreError> {
        let idx = self.set.column_index(column)?;
        let set = self.set;
        Ok(self.rows.iter().map(move |&r| &set.cells(r)[idx]))
    }

    /// Sorted unique non-missing values of `column` within this view.
    pub fn distinct_values(&self, column: &str) -> Result<Vec<Value>, StoreError> {
        let distinct: BTreeSet<&Value> = self
            .column_values(column)?
            .filter(|v| !v.is_missing())
            .collect();
        Ok(distinct.into_iter().cloned().collect())
    }

    /// Narrow this view by every active selection. Selections on columns the
    /// record set does not have are skipped.
    pub fn apply_filters(&self, selection: &FilterSelection) -> FilteredView<'a> {
        let mut active: Vec<(usize, &Selection)> = Vec::new();
        for (name, sel) in selection.iter() {
            if sel.is_unrestricted() {
                continue;
            }
            let idx = match self.set.column_index(name) {
                Ok(idx) => idx,
                Err(_) => {
                    debug!(column = %name, "selection on absent column skipped");
                    continue;
                }
            };
            if let Selection::Values { values } = sel {
                if self.covers_all(idx, values) {
                    debug!(column = %name, "selection covers every option; treated as all");
                    continue;
                }
            }
            active.push((idx, sel));
        }

        if active.is_empty() {
            return self.clone();
        }

        let set = self.set;
        let rows: Vec<usize> = self
            .rows
            .iter()
            .copied()
            .filter(|&r| {
                let cells = set.cells(r);
                active.iter().all(|(idx, sel)| sel.matches(&cells[*idx]))
            })
            .collect();

        debug!(
            rows_in = self.rows.len(),
            rows_out = rows.len(),
            active = active.len(),
            "applied filters"
        );
        FilteredView::new(set, rows)
    }

    /// "Select all": the set accepts every distinct non-missing value of the
    /// whole record set. Decided against the record set, not this view, so
    /// chained and combined filtering agree. A column with no values is
    /// never covered.
    fn covers_all(&self, idx: usize, values: &BTreeSet<Value>) -> bool {
        let mut present = (0..self.set.len())
            .map(|r| &self.set.cells(r)[idx])
            .filter(|v| !v.is_missing())
            .peekable();
        present.peek().is_some() && present.all(|v| values.contains(v))
    }
}
