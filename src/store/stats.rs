// src/store/stats.rs
//
// Spread statistics (box-plot summaries) and Pearson correlation over the
// numeric values of a filtered view.

use serde::Serialize;

use super::{ColumnKind, FilteredView, StoreError, Value};

/// Five-number summary plus mean and sample standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` below two values.
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl Summary {
    /// `None` for an empty slice.
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let std = (n > 1).then(|| {
            let ss: f64 = values.iter().map(|x| (x - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        });
        Some(Summary {
            count: n,
            mean,
            std,
            min: values[0],
            q1: quantile(&values, 0.25),
            median: quantile(&values, 0.5),
            q3: quantile(&values, 0.75),
            max: values[n - 1],
        })
    }
}

/// Linear interpolation between closest ranks; `sorted` is non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: Vec<Value>,
    /// `None` when the group has no numeric values.
    pub summary: Option<Summary>,
}

/// Symmetric matrix of pairwise correlations. A cell is `None` when fewer
/// than two rows have both values or either side is constant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.cells[i][j]
    }
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some((cov / (vx * vy).sqrt()).clamp(-1.0, 1.0))
}

impl<'a> FilteredView<'a> {
    /// Summary of the numeric values of `column`.
    pub fn summary(&self, column: &str) -> Result<Option<Summary>, StoreError> {
        let values = self.column_values(column)?.filter_map(Value::as_f64).collect();
        Ok(Summary::from_values(values))
    }

    /// `summary` per key tuple, first-seen order.
    pub fn group_summary(
        &self,
        group_columns: &[&str],
        value_column: &str,
    ) -> Result<Vec<GroupSummary>, StoreError> {
        let vi = self.set.column_index(value_column)?;
        Ok(self
            .group_rows(group_columns)?
            .into_iter()
            .map(|(key, rows)| GroupSummary {
                key,
                summary: Summary::from_values(
                    rows.iter()
                        .filter_map(|&r| self.set.cells(r)[vi].as_f64())
                        .collect(),
                ),
            })
            .collect())
    }

    /// Pairwise Pearson correlation, each pair over the rows where both
    /// values are numbers. No columns means every numeric column.
    pub fn correlation(&self, columns: &[&str]) -> Result<CorrelationMatrix, StoreError> {
        let names: Vec<String> = if columns.is_empty() {
            self.set
                .columns()
                .iter()
                .filter(|c| c.kind == ColumnKind::Numeric)
                .map(|c| c.name.clone())
                .collect()
        } else {
            columns.iter().map(|c| c.to_string()).collect()
        };
        let idx: Vec<usize> = names
            .iter()
            .map(|c| self.set.column_index(c))
            .collect::<Result<_, _>>()?;

        let mut cells = vec![vec![None; idx.len()]; idx.len()];
        for i in 0..idx.len() {
            for j in i..idx.len() {
                let pairs: Vec<(f64, f64)> = self
                    .rows
                    .iter()
                    .filter_map(|&r| {
                        let row = self.set.cells(r);
                        Some((row[idx[i]].as_f64()?, row[idx[j]].as_f64()?))
                    })
                    .collect();
                let r = pearson(&pairs).map(|r| if i == j { 1.0 } else { r });
                cells[i][j] = r;
                cells[j][i] = r;
            }
        }
        Ok(CorrelationMatrix {
            columns: names,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordSet;

    fn interns() -> RecordSet {
        let rows = [
            ("Ops", Some(20.0), Some(18.0), 2.0, Some(3.0)),
            ("Ops", Some(22.0), Some(21.0), 1.0, Some(4.0)),
            ("Finance", Some(15.0), Some(12.0), 3.0, None),
            ("Finance", Some(25.0), Some(25.0), 0.0, Some(5.0)),
            ("Ops", None, Some(10.0), 4.0, Some(2.0)),
        ];
        RecordSet::new(
            vec![
                "Team".into(),
                "Days Worked".into(),
                "Attendance Days".into(),
                "Absences".into(),
                "Score".into(),
            ],
            rows.iter()
                .map(|&(team, days, attended, absences, score)| {
                    vec![
                        team.into(),
                        days.into(),
                        attended.into(),
                        absences.into(),
                        score.into(),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn summary_uses_interpolated_quartiles() {
        let s = Summary::from_values(vec![4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!((s.count, s.min, s.max), (4, 1.0, 4.0));
        assert_eq!((s.q1, s.median, s.q3), (1.75, 2.5, 3.25));
        assert_eq!(s.mean, 2.5);
        assert!((s.std.unwrap() - 1.290_994_448_735_805_6).abs() < 1e-12);

        let one = Summary::from_values(vec![7.0]).unwrap();
        assert_eq!((one.q1, one.median, one.q3, one.std), (7.0, 7.0, 7.0, None));
        assert_eq!(Summary::from_values(Vec::new()), None);
    }

    #[test]
    fn group_summary_skips_missing() {
        let rs = interns();
        let groups = rs.view().group_summary(&["Team"], "Score").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, vec![Value::text("Ops")]);
        let ops = groups[0].summary.as_ref().unwrap();
        assert_eq!((ops.count, ops.min, ops.median, ops.max), (3, 2.0, 3.0, 4.0));
        assert_eq!(groups[1].summary.as_ref().unwrap().count, 1);

        let whole = rs.view().summary("Days Worked").unwrap().unwrap();
        assert_eq!(whole.count, 4);
        assert_eq!(rs.view().summary("Team").unwrap(), None);
    }

    #[test]
    fn correlation_over_numeric_columns() {
        let rs = interns();
        let m = rs.view().correlation(&[]).unwrap();
        assert_eq!(
            m.columns,
            vec!["Days Worked", "Attendance Days", "Absences", "Score"]
        );
        assert_eq!(m.get("Absences", "Absences"), Some(1.0));
        let r = m.get("Days Worked", "Attendance Days").unwrap();
        assert!(r > 0.9 && r <= 1.0);
        assert_eq!(m.get("Days Worked", "Attendance Days"), m.get("Attendance Days", "Days Worked"));
        assert!(m.get("Attendance Days", "Absences").unwrap() < 0.0);
    }

    #[test]
    fn correlation_edge_cases() {
        let rs = RecordSet::new(
            vec!["Flat".into(), "Rising".into(), "Label".into()],
            vec![
                vec![1.0.into(), 1.0.into(), "a".into()],
                vec![1.0.into(), 2.0.into(), "b".into()],
            ],
        );
        let m = rs.view().correlation(&["Flat", "Rising"]).unwrap();
        assert_eq!(m.get("Flat", "Rising"), None);
        assert_eq!(m.get("Flat", "Flat"), None);
        assert_eq!(m.get("Rising", "Rising"), Some(1.0));
        assert!(rs.view().correlation(&["Rising", "Missing"]).is_err());
    }
}
