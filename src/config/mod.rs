//! Declarative dashboard definitions (YAML): where the data comes from,
//! which filters are offered and which panels are drawn.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::{
    load::Source,
    store::{Aggregator, Value},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub title: String,
    pub source: Source,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub panels: Vec<PanelConfig>,
}

impl DashboardConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing dashboard definition")
    }

    /// Read a definition from disk. A relative `source.path` is taken
    /// relative to the definition's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading dashboard definition {}", path.display()))?;
        let mut config = Self::from_yaml(&text)
            .with_context(|| format!("in {}", path.display()))?;
        if config.source.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.source.path = dir.join(&config.source.path);
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Overrides the control picked from the column kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FilterKind>,
}

impl FilterConfig {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Values,
    Range,
}

/// Presentation hint, passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Pie,
    Bar,
    Line,
    Scatter,
    Heatmap,
    Box,
    Table,
    Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartKind>,
    #[serde(flatten)]
    pub spec: PanelSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelSpec {
    /// Single number tile.
    Metric {
        #[serde(default)]
        column: Option<String>,
        stat: Stat,
    },
    /// Value counts of one column.
    Distribution { column: String },
    Counts { group_by: Vec<String> },
    Aggregate {
        group_by: Vec<String>,
        value: String,
        aggregator: Aggregator,
    },
    /// Several aggregates per group, one table row per group.
    MultiAggregate {
        group_by: Vec<String>,
        values: Vec<ValueAggregate>,
    },
    /// Min, quartiles, max, mean and std per group (box plots).
    Summary {
        #[serde(default)]
        group_by: Vec<String>,
        value: String,
    },
    /// Percentage of rows whose `column` is one of `values`, per group or
    /// for the whole view.
    Share {
        #[serde(default)]
        group_by: Vec<String>,
        column: String,
        values: Vec<Value>,
    },
    /// Pairwise correlation; every numeric column when none are listed.
    Correlation {
        #[serde(default)]
        columns: Vec<String>,
    },
    Pivot {
        index: String,
        columns: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default = "default_aggregator")]
        aggregator: Aggregator,
    },
    /// The `n` rows with the largest `column`, showing `show`.
    Top {
        column: String,
        n: usize,
        #[serde(default)]
        show: Vec<String>,
    },
    Table {
        #[serde(default)]
        columns: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueAggregate {
    pub column: String,
    pub aggregator: Aggregator,
}

fn default_aggregator() -> Aggregator {
    Aggregator::Sum
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Rows,
    Unique,
    Mode,
    Sum,
    Mean,
}
