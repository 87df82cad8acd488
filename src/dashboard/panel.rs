// src/dashboard/panel.rs
//
// One panel definition evaluated against a filtered view. Failures turn into
// `PanelBody::Skipped` so a bad panel never takes the others down.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::{PanelConfig, PanelSpec, Stat, ValueAggregate};
use crate::store::{
    Aggregator, CorrelationMatrix, FilteredView, GroupAggregate, GroupAggregates, GroupCount,
    GroupSummary, PivotTable, StoreError, Table, Value,
};

/// Data behind one panel, ready for a presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelBody {
    /// `None` renders as "N/A".
    Metric { value: Option<Value> },
    Distribution {
        column: String,
        counts: Vec<(Value, usize)>,
    },
    Counts {
        group_by: Vec<String>,
        groups: Vec<GroupCount>,
    },
    Aggregates {
        group_by: Vec<String>,
        value: String,
        aggregator: Aggregator,
        groups: Vec<GroupAggregate>,
    },
    MultiAggregates {
        group_by: Vec<String>,
        values: Vec<ValueAggregate>,
        groups: Vec<GroupAggregates>,
    },
    Summaries {
        group_by: Vec<String>,
        value: String,
        groups: Vec<GroupSummary>,
    },
    /// Percentages per group; an ungrouped share is a `Metric`.
    Shares {
        group_by: Vec<String>,
        column: String,
        groups: Vec<GroupAggregate>,
    },
    Correlation(CorrelationMatrix),
    Pivot(PivotTable),
    Table(Table),
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelOutput {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<crate::config::ChartKind>,
    pub body: PanelBody,
}

impl PanelOutput {
    pub fn is_skipped(&self) -> bool {
        matches!(self.body, PanelBody::Skipped { .. })
    }
}

pub(crate) fn render_panel(panel: &PanelConfig, view: &FilteredView<'_>) -> PanelOutput {
    let body = match evaluate(&panel.spec, view) {
        Ok(body) => body,
        Err(reason) => {
            warn!(panel = %panel.title, %reason, "panel skipped");
            PanelBody::Skipped { reason }
        }
    };
    debug!(panel = %panel.title, skipped = matches!(body, PanelBody::Skipped { .. }), "rendered panel");
    PanelOutput {
        title: panel.title.clone(),
        chart: panel.chart,
        body,
    }
}

fn evaluate(spec: &PanelSpec, view: &FilteredView<'_>) -> Result<PanelBody, String> {
    let missing = |e: StoreError| e.to_string();
    match spec {
        PanelSpec::Metric { column, stat } => {
            let value = match (stat, column.as_deref()) {
                (Stat::Rows, _) => Some(Value::number(view.len() as f64)),
                (_, None) => return Err(format!("metric `{stat:?}` needs a column")),
                (Stat::Unique, Some(c)) => {
                    Some(Value::number(view.n_unique(c).map_err(missing)? as f64))
                }
                (Stat::Mode, Some(c)) => view.mode(c).map_err(missing)?,
                (Stat::Sum, Some(c)) => view
                    .aggregate(c, Aggregator::Sum)
                    .map_err(missing)?
                    .map(Value::number),
                (Stat::Mean, Some(c)) => view
                    .aggregate(c, Aggregator::Mean)
                    .map_err(missing)?
                    .map(Value::number),
            };
            Ok(PanelBody::Metric { value })
        }
        PanelSpec::Distribution { column } => {
            let counts = view.value_counts(column).map_err(missing)?;
            if counts.is_empty() {
                return Err(format!("no values in column `{column}`"));
            }
            Ok(PanelBody::Distribution {
                column: column.clone(),
                counts,
            })
        }
        PanelSpec::Counts { group_by } => {
            let cols: Vec<&str> = group_by.iter().map(String::as_str).collect();
            Ok(PanelBody::Counts {
                group_by: group_by.clone(),
                groups: view.group_and_count(&cols).map_err(missing)?,
            })
        }
        PanelSpec::Aggregate {
            group_by,
            value,
            aggregator,
        } => {
            let cols: Vec<&str> = group_by.iter().map(String::as_str).collect();
            Ok(PanelBody::Aggregates {
                group_by: group_by.clone(),
                value: value.clone(),
                aggregator: *aggregator,
                groups: view
                    .group_and_aggregate(&cols, value, *aggregator)
                    .map_err(missing)?,
            })
        }
        PanelSpec::MultiAggregate { group_by, values } => {
            let cols: Vec<&str> = group_by.iter().map(String::as_str).collect();
            let pairs: Vec<(&str, Aggregator)> = values
                .iter()
                .map(|v| (v.column.as_str(), v.aggregator))
                .collect();
            Ok(PanelBody::MultiAggregates {
                group_by: group_by.clone(),
                values: values.clone(),
                groups: view
                    .group_and_aggregate_many(&cols, &pairs)
                    .map_err(missing)?,
            })
        }
        PanelSpec::Summary { group_by, value } => {
            let cols: Vec<&str> = group_by.iter().map(String::as_str).collect();
            Ok(PanelBody::Summaries {
                group_by: group_by.clone(),
                value: value.clone(),
                groups: view.group_summary(&cols, value).map_err(missing)?,
            })
        }
        PanelSpec::Share {
            group_by,
            column,
            values,
        } => {
            let accepted = accepted_values(view, column, values).map_err(missing)?;
            if group_by.is_empty() {
                return Ok(PanelBody::Metric {
                    value: view.share(column, &accepted).map_err(missing)?.map(Value::number),
                });
            }
            let cols: Vec<&str> = group_by.iter().map(String::as_str).collect();
            Ok(PanelBody::Shares {
                group_by: group_by.clone(),
                column: column.clone(),
                groups: view.group_share(&cols, column, &accepted).map_err(missing)?,
            })
        }
        PanelSpec::Correlation { columns } => {
            let cols: Vec<&str> = columns.iter().map(String::as_str).collect();
            let matrix = view.correlation(&cols).map_err(missing)?;
            if matrix.columns.len() < 2 {
                return Err("correlation needs at least two numeric columns".to_string());
            }
            Ok(PanelBody::Correlation(matrix))
        }
        PanelSpec::Pivot {
            index,
            columns,
            value,
            aggregator,
        } => {
            let value = value.as_deref().map(|v| (v, *aggregator));
            Ok(PanelBody::Pivot(
                view.pivot(index, columns, value).map_err(missing)?,
            ))
        }
        PanelSpec::Top { column, n, show } => {
            let top = view.top_n(column, *n).map_err(missing)?;
            Ok(PanelBody::Table(projection(&top, show)?))
        }
        PanelSpec::Table { columns } => Ok(PanelBody::Table(projection(view, columns)?)),
    }
}

/// Configured values as they appear in the column (YAML has no date type).
fn accepted_values(
    view: &FilteredView<'_>,
    column: &str,
    values: &[Value],
) -> Result<BTreeSet<Value>, StoreError> {
    let set = view.record_set();
    values
        .iter()
        .map(|v| match v {
            Value::Text(s) => set.resolve_value(column, s),
            v => Ok(v.clone()),
        })
        .collect()
}

/// Requested columns that exist; every column when none are requested.
fn projection(view: &FilteredView<'_>, columns: &[String]) -> Result<Table, String> {
    if columns.is_empty() {
        return Ok(view.to_table());
    }
    let set = view.record_set();
    let absent: Vec<&str> = columns
        .iter()
        .map(String::as_str)
        .filter(|c| !set.has_column(c))
        .collect();
    if absent.len() == columns.len() {
        return Err(format!("none of the columns {absent:?} exist"));
    }
    if !absent.is_empty() {
        debug!(?absent, "dropping absent table columns");
    }
    let cols: Vec<&str> = columns.iter().map(String::as_str).collect();
    Ok(view.project(&cols))
}
