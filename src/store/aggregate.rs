// src/store/aggregate.rs
//
// Grouping and summary queries over a filtered view. Group results come back
// in first-seen key order; pivot keys are sorted.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{FilteredView, StoreError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    Sum,
    Mean,
    Count,
}

/// Running sum/count over the numeric values of a group.
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: f64,
    count: usize,
}

impl Accumulator {
    fn push(&mut self, value: &Value) {
        if let Some(n) = value.as_f64() {
            self.sum += n;
            self.count += 1;
        }
    }

    /// `None` when the group had no numeric values at all.
    fn finish(self, aggregator: Aggregator) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match aggregator {
            Aggregator::Sum => self.sum,
            Aggregator::Mean => self.sum / self.count as f64,
            Aggregator::Count => self.count as f64,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCount {
    pub key: Vec<Value>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAggregate {
    pub key: Vec<Value>,
    /// `None` means undefined: every value in the group was missing.
    pub value: Option<f64>,
}

/// Several aggregates of one group, in the order they were requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAggregates {
    pub key: Vec<Value>,
    pub values: Vec<Option<f64>>,
}

/// Two-way matrix, e.g. deal type × readiness. Empty cells hold 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub index: String,
    pub columns: String,
    pub row_keys: Vec<Value>,
    pub column_keys: Vec<Value>,
    pub cells: Vec<Vec<f64>>,
}

impl PivotTable {
    pub fn cell(&self, row: &Value, column: &Value) -> Option<f64> {
        let r = self.row_keys.iter().position(|k| k == row)?;
        let c = self.column_keys.iter().position(|k| k == column)?;
        Some(self.cells[r][c])
    }
}

/// A projection of a view onto a list of columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl<'a> FilteredView<'a> {
    fn column_indices(&self, columns: &[&str]) -> Result<Vec<usize>, StoreError> {
        columns.iter().map(|c| self.set.column_index(c)).collect()
    }

    fn key_of(&self, row: usize, idx: &[usize]) -> Vec<Value> {
        let cells = self.set.cells(row);
        idx.iter().map(|&i| cells[i].clone()).collect()
    }

    /// Row count per distinct key tuple, first-seen order. Missing is a
    /// valid key component, so the counts always add up to `self.len()`.
    pub fn group_and_count(&self, group_columns: &[&str]) -> Result<Vec<GroupCount>, StoreError> {
        let idx = self.column_indices(group_columns)?;
        let mut slots: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<GroupCount> = Vec::new();

        for &r in &self.rows {
            let key = self.key_of(r, &idx);
            match slots.get(&key) {
                Some(&slot) => groups[slot].count += 1,
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push(GroupCount { key, count: 1 });
                }
            }
        }
        Ok(groups)
    }

    /// Aggregate `value_column` per key tuple, first-seen order. Missing and
    /// non-numeric values are skipped.
    pub fn group_and_aggregate(
        &self,
        group_columns: &[&str],
        value_column: &str,
        aggregator: Aggregator,
    ) -> Result<Vec<GroupAggregate>, StoreError> {
        let idx = self.column_indices(group_columns)?;
        let value_idx = self.set.column_index(value_column)?;
        let mut slots: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Accumulator)> = Vec::new();

        for &r in &self.rows {
            let key = self.key_of(r, &idx);
            let slot = match slots.get(&key) {
                Some(&slot) => slot,
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push((key, Accumulator::default()));
                    groups.len() - 1
                }
            };
            groups[slot].1.push(&self.set.cells(r)[value_idx]);
        }

        Ok(groups
            .into_iter()
            .map(|(key, acc)| GroupAggregate {
                key,
                value: acc.finish(aggregator),
            })
            .collect())
    }

    /// Whole-view aggregate of one column, for metric tiles.
    pub fn aggregate(&self, column: &str, aggregator: Aggregator) -> Result<Option<f64>, StoreError> {
        let mut acc = Accumulator::default();
        for v in self.column_values(column)? {
            acc.push(v);
        }
        Ok(acc.finish(aggregator))
    }

    /// Non-missing value frequencies, most frequent first; ties keep
    /// first-seen order.
    pub fn value_counts(&self, column: &str) -> Result<Vec<(Value, usize)>, StoreError> {
        let mut slots: HashMap<&Value, usize> = HashMap::new();
        let mut counts: Vec<(&Value, usize)> = Vec::new();
        for v in self.column_values(column)?.filter(|v| !v.is_missing()) {
            match slots.get(v) {
                Some(&slot) => counts[slot].1 += 1,
                None => {
                    slots.insert(v, counts.len());
                    counts.push((v, 1));
                }
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(counts.into_iter().map(|(v, n)| (v.clone(), n)).collect())
    }

    /// Most frequent non-missing value; ties go to the smallest value.
    pub fn mode(&self, column: &str) -> Result<Option<Value>, StoreError> {
        let counts = self.value_counts(column)?;
        Ok(counts
            .into_iter()
            .min_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .map(|(v, _)| v))
    }

    pub fn n_unique(&self, column: &str) -> Result<usize, StoreError> {
        let distinct: BTreeSet<&Value> = self
            .column_values(column)?
            .filter(|v| !v.is_missing())
            .collect();
        Ok(distinct.len())
    }

    /// Smallest and largest non-missing values.
    pub fn column_range(&self, column: &str) -> Result<Option<(Value, Value)>, StoreError> {
        let mut bounds: Option<(&Value, &Value)> = None;
        for v in self.column_values(column)?.filter(|v| !v.is_missing()) {
            bounds = Some(match bounds {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        Ok(bounds.map(|(lo, hi)| (lo.clone(), hi.clone())))
    }

    /// The `n` rows with the largest non-missing values of `column`.
    pub fn top_n(&self, column: &str, n: usize) -> Result<FilteredView<'a>, StoreError> {
        let idx = self.set.column_index(column)?;
        let set = self.set;
        let mut rows: Vec<usize> = self
            .rows
            .iter()
            .copied()
            .filter(|&r| !set.cells(r)[idx].is_missing())
            .collect();
        rows.sort_by(|&a, &b| set.cells(b)[idx].cmp(&set.cells(a)[idx]));
        rows.truncate(n);
        Ok(FilteredView::new(set, rows))
    }

    /// Cross-tabulate `index` × `columns`. Without a value column each cell
    /// is a row count, otherwise the aggregate of `value`. Rows where either
    /// key is missing are left out.
    pub fn pivot(
        &self,
        index: &str,
        columns: &str,
        value: Option<(&str, Aggregator)>,
    ) -> Result<PivotTable, StoreError> {
        let row_idx = self.set.column_index(index)?;
        let col_idx = self.set.column_index(columns)?;
        let value_idx = value
            .map(|(c, agg)| self.set.column_index(c).map(|i| (i, agg)))
            .transpose()?;

        let mut cells: BTreeMap<(&Value, &Value), Accumulator> = BTreeMap::new();
        let mut row_keys: BTreeSet<&Value> = BTreeSet::new();
        let mut column_keys: BTreeSet<&Value> = BTreeSet::new();

        for &r in &self.rows {
            let row = self.set.cells(r);
            let (rk, ck) = (&row[row_idx], &row[col_idx]);
            if rk.is_missing() || ck.is_missing() {
                continue;
            }
            row_keys.insert(rk);
            column_keys.insert(ck);
            let acc = cells.entry((rk, ck)).or_default();
            match value_idx {
                Some((vi, _)) => acc.push(&row[vi]),
                None => acc.count += 1,
            }
        }

        let grid = row_keys
            .iter()
            .map(|rk| {
                column_keys
                    .iter()
                    .map(|ck| {
                        let acc = cells.get(&(*rk, *ck)).copied().unwrap_or_default();
                        match value_idx {
                            Some((_, agg)) => acc.finish(agg).unwrap_or(0.0),
                            None => acc.count as f64,
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(PivotTable {
            index: index.to_string(),
            columns: columns.to_string(),
            row_keys: row_keys.into_iter().cloned().collect(),
            column_keys: column_keys.into_iter().cloned().collect(),
            cells: grid,
        })
    }

    /// Keep only the named columns that exist, in the given order.
    pub fn project(&self, columns: &[&str]) -> Table {
        let present: Vec<(&str, usize)> = columns
            .iter()
            .filter_map(|c| self.set.column_index(c).ok().map(|i| (*c, i)))
            .collect();
        Table {
            columns: present.iter().map(|(c, _)| c.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|&r| {
                    let cells = self.set.cells(r);
                    present.iter().map(|&(_, i)| cells[i].clone()).collect()
                })
                .collect(),
        }
    }

    /// Every column, in record-set order.
    pub fn to_table(&self) -> Table {
        let names: Vec<&str> = self.set.column_names().collect();
        self.project(&names)
    }

    /// Row indices per key tuple, first-seen order.
    pub(super) fn group_rows(
        &self,
        group_columns: &[&str],
    ) -> Result<Vec<(Vec<Value>, Vec<usize>)>, StoreError> {
        let idx = self.column_indices(group_columns)?;
        let mut slots: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();
        for &r in &self.rows {
            let key = self.key_of(r, &idx);
            match slots.get(&key) {
                Some(&slot) => groups[slot].1.push(r),
                None => {
                    slots.insert(key.clone(), groups.len());
                    groups.push((key, vec![r]));
                }
            }
        }
        Ok(groups)
    }

    /// Like `group_and_aggregate`, for several `(column, aggregator)` pairs
    /// at once, e.g. mean fund size next to a count per client type.
    pub fn group_and_aggregate_many(
        &self,
        group_columns: &[&str],
        values: &[(&str, Aggregator)],
    ) -> Result<Vec<GroupAggregates>, StoreError> {
        let value_idx: Vec<(usize, Aggregator)> = values
            .iter()
            .map(|(c, agg)| self.set.column_index(c).map(|i| (i, *agg)))
            .collect::<Result<_, _>>()?;

        Ok(self
            .group_rows(group_columns)?
            .into_iter()
            .map(|(key, rows)| {
                let values = value_idx
                    .iter()
                    .map(|&(vi, agg)| {
                        let mut acc = Accumulator::default();
                        for &r in &rows {
                            acc.push(&self.set.cells(r)[vi]);
                        }
                        acc.finish(agg)
                    })
                    .collect();
                GroupAggregates { key, values }
            })
            .collect())
    }

    /// Percentage of rows whose `column` value is one of `accepted`. Missing
    /// values count as not accepted. `None` for an empty view.
    pub fn share(&self, column: &str, accepted: &BTreeSet<Value>) -> Result<Option<f64>, StoreError> {
        let idx = self.set.column_index(column)?;
        Ok(share_of(self.set, &self.rows, idx, accepted))
    }

    /// `share` per key tuple, first-seen order.
    pub fn group_share(
        &self,
        group_columns: &[&str],
        column: &str,
        accepted: &BTreeSet<Value>,
    ) -> Result<Vec<GroupAggregate>, StoreError> {
        let idx = self.set.column_index(column)?;
        Ok(self
            .group_rows(group_columns)?
            .into_iter()
            .map(|(key, rows)| GroupAggregate {
                key,
                value: share_of(self.set, &rows, idx, accepted),
            })
            .collect())
    }
}

fn share_of(
    set: &super::RecordSet,
    rows: &[usize],
    idx: usize,
    accepted: &BTreeSet<Value>,
) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let hits = rows
        .iter()
        .filter(|&&r| {
            let v = &set.cells(r)[idx];
            !v.is_missing() && accepted.contains(v)
        })
        .count();
    Some(hits as f64 / rows.len() as f64 * 100.0)
}

/// Order groups by key, for callers that want sorted rather than first-seen
/// output (e.g. a time axis).
pub fn sort_by_key<T, F>(groups: &mut [T], key: F)
where
    F: Fn(&T) -> &[Value],
{
    groups.sort_by(|a, b| key(a).iter().cmp(key(b).iter()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordSet;

    fn sectors() -> RecordSet {
        RecordSet::new(
            vec!["Sector".into(), "Value".into()],
            vec![
                vec![Value::text("Tech"), Value::number(10.0)],
                vec![Value::text("Tech"), Value::Missing],
                vec![Value::text("Health"), Value::number(20.0)],
            ],
        )
    }

    fn deals() -> RecordSet {
        let rows = [
            ("Buyout", 3.0, "Tech", Some(120.0)),
            ("Growth", 1.0, "Health", Some(40.0)),
            ("Buyout", 3.0, "Health", None),
            ("Growth", 5.0, "Tech", Some(75.0)),
            ("Buyout", 1.0, "Tech", Some(300.0)),
            ("Venture", 5.0, "Energy", None),
        ];
        RecordSet::new(
            vec![
                "Deal Type".into(),
                "Readiness".into(),
                "Sector".into(),
                "Valuation".into(),
            ],
            rows.iter()
                .map(|(t, r, s, v)| {
                    vec![
                        Value::text(*t),
                        Value::number(*r),
                        Value::text(*s),
                        Value::from(*v),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn mean_by_sector_scenario() {
        let rs = sectors();
        let out = rs
            .view()
            .group_and_aggregate(&["Sector"], "Value", Aggregator::Mean)
            .unwrap();
        assert_eq!(
            out,
            vec![
                GroupAggregate {
                    key: vec![Value::text("Tech")],
                    value: Some(10.0)
                },
                GroupAggregate {
                    key: vec![Value::text("Health")],
                    value: Some(20.0)
                },
            ]
        );
    }

    #[test]
    fn all_missing_group_is_undefined() {
        let rs = deals();
        let view = rs.view();
        for agg in [Aggregator::Sum, Aggregator::Mean, Aggregator::Count] {
            let out = view.group_and_aggregate(&["Sector"], "Valuation", agg).unwrap();
            let energy = out
                .iter()
                .find(|g| g.key == vec![Value::text("Energy")])
                .unwrap();
            assert_eq!(energy.value, None, "{agg:?}");
        }
        let sums = view
            .group_and_aggregate(&["Sector"], "Valuation", Aggregator::Sum)
            .unwrap();
        assert_eq!(sums[0].value, Some(495.0));
        assert_eq!(sums[1].value, Some(40.0));
    }

    #[test]
    fn group_counts_sum_to_view_len() {
        let rs = deals();
        let view = rs.view();
        for cols in [
            vec!["Deal Type"],
            vec!["Deal Type", "Sector"],
            vec!["Valuation"],
            vec![],
        ] {
            let groups = view.group_and_count(&cols).unwrap();
            let total: usize = groups.iter().map(|g| g.count).sum();
            assert_eq!(total, view.len(), "{cols:?}");
        }
        let empty = rs.apply_filters(
            &crate::store::FilterSelection::new()
                .with("Sector", crate::store::Selection::values(["Nowhere"])),
        );
        assert!(empty.group_and_count(&["Sector"]).unwrap().is_empty());
    }

    #[test]
    fn group_keys_come_in_first_seen_order() {
        let rs = deals();
        let groups = rs.view().group_and_count(&["Deal Type", "Sector"]).unwrap();
        let keys: Vec<String> = groups
            .iter()
            .map(|g| format!("{}/{}", g.key[0], g.key[1]))
            .collect();
        assert_eq!(
            keys,
            vec![
                "Buyout/Tech",
                "Growth/Health",
                "Buyout/Health",
                "Growth/Tech",
                "Venture/Energy"
            ]
        );
        assert_eq!(groups[0].count, 2);
    }

    #[test]
    fn group_by_absent_column_fails() {
        let rs = deals();
        assert_eq!(
            rs.view().group_and_count(&["Region"]),
            Err(StoreError::ColumnNotFound("Region".into()))
        );
    }

    #[test]
    fn value_counts_and_mode() {
        let rs = deals();
        let view = rs.view();
        let counts = view.value_counts("Sector").unwrap();
        assert_eq!(
            counts,
            vec![
                (Value::text("Tech"), 3),
                (Value::text("Health"), 2),
                (Value::text("Energy"), 1)
            ]
        );
        assert_eq!(view.mode("Sector").unwrap(), Some(Value::text("Tech")));
        // readiness 1, 3 and 5 all appear twice: smallest wins
        assert_eq!(view.mode("Readiness").unwrap(), Some(Value::number(1.0)));
        assert_eq!(view.n_unique("Deal Type").unwrap(), 3);
    }

    #[test]
    fn mode_of_all_missing_column_is_none() {
        let rs = RecordSet::new(
            vec!["Notes".into()],
            vec![vec![Value::Missing], vec![Value::Missing]],
        );
        assert_eq!(rs.view().mode("Notes").unwrap(), None);
    }

    #[test]
    fn top_n_sorts_descending_and_skips_missing() {
        let rs = deals();
        let top = rs.view().top_n("Valuation", 2).unwrap();
        assert_eq!(top.row_indices(), &[4, 0]);
        let all = rs.view().top_n("Valuation", 10).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn pivot_counts_fill_zero() {
        let rs = deals();
        let pivot = rs.view().pivot("Deal Type", "Readiness", None).unwrap();
        assert_eq!(
            pivot.row_keys,
            vec![
                Value::text("Buyout"),
                Value::text("Growth"),
                Value::text("Venture")
            ]
        );
        assert_eq!(
            pivot.column_keys,
            vec![Value::number(1.0), Value::number(3.0), Value::number(5.0)]
        );
        assert_eq!(pivot.cells[0], vec![1.0, 2.0, 0.0]);
        assert_eq!(
            pivot.cell(&Value::text("Venture"), &Value::number(5.0)),
            Some(1.0)
        );
    }

    #[test]
    fn pivot_sums_value_column() {
        let rs = deals();
        let pivot = rs
            .view()
            .pivot("Sector", "Deal Type", Some(("Valuation", Aggregator::Sum)))
            .unwrap();
        assert_eq!(
            pivot.cell(&Value::text("Tech"), &Value::text("Buyout")),
            Some(420.0)
        );
        assert_eq!(
            pivot.cell(&Value::text("Energy"), &Value::text("Venture")),
            Some(0.0)
        );
    }

    #[test]
    fn project_skips_absent_columns() {
        let rs = deals();
        let table = rs.view().project(&["Sector", "Email", "Deal Type"]);
        assert_eq!(table.columns, vec!["Sector", "Deal Type"]);
        assert_eq!(table.rows.len(), 6);
        assert_eq!(table.rows[5], vec![Value::text("Energy"), Value::text("Venture")]);
    }

    #[test]
    fn column_range_and_whole_view_aggregate() {
        let rs = deals();
        let view = rs.view();
        assert_eq!(
            view.column_range("Readiness").unwrap(),
            Some((Value::number(1.0), Value::number(5.0)))
        );
        assert_eq!(view.aggregate("Valuation", Aggregator::Mean).unwrap(), Some(133.75));
        assert_eq!(view.aggregate("Sector", Aggregator::Sum).unwrap(), None);
    }

    #[test]
    fn sort_by_key_orders_groups() {
        let rs = deals();
        let mut groups = rs.view().group_and_count(&["Sector"]).unwrap();
        sort_by_key(&mut groups, |g| g.key.as_slice());
        let keys: Vec<String> = groups.iter().map(|g| g.key[0].to_string()).collect();
        assert_eq!(keys, vec!["Energy", "Health", "Tech"]);
    }

    #[test]
    fn several_aggregates_per_group() {
        let rs = deals();
        let groups = rs
            .view()
            .group_and_aggregate_many(
                &["Deal Type"],
                &[
                    ("Valuation", Aggregator::Mean),
                    ("Valuation", Aggregator::Count),
                    ("Readiness", Aggregator::Sum),
                ],
            )
            .unwrap();
        assert_eq!(
            groups,
            vec![
                GroupAggregates {
                    key: vec![Value::text("Buyout")],
                    values: vec![Some(210.0), Some(2.0), Some(7.0)],
                },
                GroupAggregates {
                    key: vec![Value::text("Growth")],
                    values: vec![Some(57.5), Some(2.0), Some(6.0)],
                },
                GroupAggregates {
                    key: vec![Value::text("Venture")],
                    values: vec![None, None, Some(5.0)],
                },
            ]
        );
        assert!(rs
            .view()
            .group_and_aggregate_many(&["Deal Type"], &[("Margin", Aggregator::Sum)])
            .is_err());
    }

    #[test]
    fn share_counts_missing_as_not_accepted() {
        let rs = deals();
        let tech: BTreeSet<Value> = [Value::text("Tech")].into_iter().collect();
        assert_eq!(rs.view().share("Sector", &tech).unwrap(), Some(50.0));

        let per_type = rs.view().group_share(&["Deal Type"], "Sector", &tech).unwrap();
        let got: Vec<(String, f64)> = per_type
            .iter()
            .map(|g| (g.key[0].to_string(), g.value.unwrap()))
            .collect();
        assert_eq!(got[0].0, "Buyout");
        assert!((got[0].1 - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(got[1], ("Growth".to_string(), 50.0));
        assert_eq!(got[2], ("Venture".to_string(), 0.0));

        let priced: BTreeSet<Value> = [Value::number(120.0)].into_iter().collect();
        assert_eq!(rs.view().share("Valuation", &priced).unwrap().map(|p| p.round()), Some(17.0));

        let empty = rs.apply_filters(
            &crate::store::FilterSelection::new()
                .with("Sector", crate::store::Selection::values(["Mining"])),
        );
        assert_eq!(empty.share("Sector", &tech).unwrap(), None);
    }
}
