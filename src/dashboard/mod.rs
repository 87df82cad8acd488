//! A loaded dashboard: one record set plus its definition. Rendering is a
//! stateless full re-filter per selection.

pub mod panel;
pub mod selection;

use anyhow::{Context, Result};
use serde::Serialize;
use std::{path::Path, time::Instant};
use tracing::{info, warn};

use crate::config::{DashboardConfig, FilterConfig, FilterKind};
use crate::load;
use crate::store::{ColumnKind, FilterSelection, FilteredView, RecordSet, Value};

pub use panel::{PanelBody, PanelOutput};

pub struct Dashboard {
    config: DashboardConfig,
    records: RecordSet,
}

/// A filter widget the presentation layer should draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterControl {
    pub column: String,
    pub label: String,
    pub input: ControlInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlInput {
    /// Options are the sorted distinct values of the whole record set.
    MultiSelect { options: Vec<Value> },
    /// Initial slider bounds; `None` when the column has no values.
    Range {
        kind: ColumnKind,
        min: Option<Value>,
        max: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Render {
    pub title: String,
    pub total_rows: usize,
    /// Rows left after filtering.
    pub rows: usize,
    pub panels: Vec<PanelOutput>,
}

impl Dashboard {
    /// Read the definition and load its source once.
    pub fn open(path: &Path) -> Result<Self> {
        let config = DashboardConfig::from_file(path)?;
        let records = load::load(&config.source)
            .with_context(|| format!("loading data for dashboard `{}`", config.title))?;
        Ok(Self::from_parts(config, records))
    }

    pub fn from_parts(config: DashboardConfig, records: RecordSet) -> Self {
        Self { config, records }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    /// Controls for the configured filters. Filters on absent columns are
    /// left out.
    pub fn filter_controls(&self) -> Vec<FilterControl> {
        self.config
            .filters
            .iter()
            .filter_map(|f| match self.control(f) {
                Ok(control) => Some(control),
                Err(e) => {
                    warn!(column = %f.column, error = %e, "filter not applicable; skipped");
                    None
                }
            })
            .collect()
    }

    fn control(&self, filter: &FilterConfig) -> Result<FilterControl> {
        let desc = self.records.column(&filter.column)?;
        let kind = filter.kind.unwrap_or(if desc.kind.is_ordered() {
            FilterKind::Range
        } else {
            FilterKind::Values
        });
        let input = match kind {
            FilterKind::Values => ControlInput::MultiSelect {
                options: self.records.distinct_values(&filter.column)?,
            },
            FilterKind::Range => {
                let bounds = self.records.view().column_range(&filter.column)?;
                let (min, max) = bounds.map_or((None, None), |(lo, hi)| (Some(lo), Some(hi)));
                ControlInput::Range {
                    kind: desc.kind,
                    min,
                    max,
                }
            }
        };
        Ok(FilterControl {
            column: filter.column.clone(),
            label: filter.label().to_string(),
            input,
        })
    }

    pub fn view(&self, selection: &FilterSelection) -> FilteredView<'_> {
        self.records.apply_filters(selection)
    }

    /// Filter, then evaluate every panel against the same view.
    #[tracing::instrument(level = "info", skip_all, fields(dashboard = %self.config.title))]
    pub fn render(&self, selection: &FilterSelection) -> Render {
        let start = Instant::now();
        let view = self.view(selection);
        let panels: Vec<PanelOutput> = self
            .config
            .panels
            .iter()
            .map(|p| panel::render_panel(p, &view))
            .collect();
        info!(
            rows = view.len(),
            total = self.records.len(),
            skipped = panels.iter().filter(|p| p.is_skipped()).count(),
            elapsed = ?start.elapsed(),
            "rendered dashboard"
        );
        Render {
            title: self.config.title.clone(),
            total_rows: self.records.len(),
            rows: view.len(),
            panels,
        }
    }
}
