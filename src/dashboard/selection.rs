// src/dashboard/selection.rs
//
// Filter selections from command-line strings (`Sector=Tech,Health`,
// `Deal Readiness=1..5`) and JSON files.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{fs, path::Path};
use tracing::warn;

use crate::load::cell;
use crate::store::{ColumnKind, FilterSelection, RecordSet, Selection, Value};

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([^=]+?)\s*=(.*)$").unwrap());
static RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(.*?)\s*\.\.\s*(.*?)\s*$").unwrap());

fn split_assignment(arg: &str) -> Result<(String, String)> {
    let caps = ASSIGNMENT
        .captures(arg)
        .with_context(|| format!("expected COLUMN=VALUE, got `{arg}`"))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

/// `COLUMN=V1,V2,...`; each value is matched against the column's existing
/// values by display text. An empty list selects everything.
pub fn parse_values(records: &RecordSet, arg: &str) -> Result<(String, Selection)> {
    let (column, list) = split_assignment(arg)?;
    let raw: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let values = if records.has_column(&column) {
        raw.iter()
            .map(|s| records.resolve_value(&column, s))
            .collect::<Result<Vec<Value>, _>>()?
    } else {
        warn!(column = %column, "selection names a column that is not in the data");
        raw.iter().map(|s| Value::text(*s)).collect()
    };
    Ok((column, Selection::values(values)))
}

/// `COLUMN=LO..HI`; either bound may be left empty.
pub fn parse_range(records: &RecordSet, arg: &str) -> Result<(String, Selection)> {
    let (column, bounds) = split_assignment(arg)?;
    let caps = RANGE
        .captures(&bounds)
        .with_context(|| format!("expected LO..HI for `{column}`, got `{bounds}`"))?;

    let kind = match records.column(&column) {
        Ok(desc) => Some(desc.kind),
        Err(_) => {
            warn!(column = %column, "selection names a column that is not in the data");
            None
        }
    };
    let min = parse_bound(records, &column, kind, &caps[1])?;
    let max = parse_bound(records, &column, kind, &caps[2])?;
    Ok((column, Selection::range(min, max)))
}

fn parse_bound(
    records: &RecordSet,
    column: &str,
    kind: Option<ColumnKind>,
    raw: &str,
) -> Result<Option<Value>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let value = match kind {
        Some(ColumnKind::Numeric) => match cell::parse_number(raw) {
            Some(n) => Value::number(n),
            None => bail!("`{raw}` is not a number (column `{column}`)"),
        },
        Some(ColumnKind::Date) => match cell::parse_date(raw) {
            Some(d) => Value::Date(d),
            None => bail!("`{raw}` is not a date (column `{column}`)"),
        },
        Some(ColumnKind::Categorical) => records.resolve_value(column, raw)?,
        None => Value::text(raw),
    };
    Ok(Some(value))
}

/// Selection saved as JSON, e.g.
/// `{"Sector": {"type": "values", "values": ["Tech"]}}`. JSON has no date
/// type, so text values and bounds are resolved against their column.
pub fn read_selection(records: &RecordSet, path: &Path) -> Result<FilterSelection> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading selection {}", path.display()))?;
    let raw: FilterSelection = serde_json::from_str(&text)
        .with_context(|| format!("parsing selection {}", path.display()))?;

    let mut selection = FilterSelection::new();
    for (column, sel) in raw.iter() {
        let resolved = resolve_selection(records, column, sel)
            .with_context(|| format!("in selection {}", path.display()))?;
        selection.set(column, resolved);
    }
    Ok(selection)
}

/// Retype text values and bounds by the column's kind, the same way the
/// command-line forms are parsed.
pub fn resolve_selection(records: &RecordSet, column: &str, sel: &Selection) -> Result<Selection> {
    let kind = match records.column(column) {
        Ok(desc) => desc.kind,
        Err(_) => {
            warn!(column = %column, "selection names a column that is not in the data");
            return Ok(sel.clone());
        }
    };
    Ok(match sel {
        Selection::All => Selection::All,
        Selection::Values { values } => Selection::values(
            values
                .iter()
                .map(|v| match v {
                    Value::Text(s) => records.resolve_value(column, s),
                    v => Ok(v.clone()),
                })
                .collect::<Result<Vec<Value>, _>>()?,
        ),
        Selection::Range { min, max } => {
            let bound = |b: &Option<Value>| -> Result<Option<Value>> {
                match b {
                    Some(Value::Text(s)) => parse_bound(records, column, Some(kind), s),
                    other => Ok(other.clone()),
                }
            };
            Selection::range(bound(min)?, bound(max)?)
        }
    })
}
