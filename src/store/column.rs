// src/store/column.rs

use serde::{Deserialize, Serialize};

use super::Value;

/// Semantic type of a column, decides which filter control it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Categorical,
    Numeric,
    Date,
}

impl ColumnKind {
    /// Numeric if every non-missing value is a number, date if every one is a
    /// date, categorical otherwise (including all-missing columns).
    pub fn infer<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut kind = None;
        for v in values {
            let this = match v {
                Value::Missing => continue,
                Value::Number(_) => ColumnKind::Numeric,
                Value::Date(_) => ColumnKind::Date,
                Value::Text(_) | Value::Bool(_) => return ColumnKind::Categorical,
            };
            match kind {
                None => kind = Some(this),
                Some(k) if k != this => return ColumnKind::Categorical,
                Some(_) => {}
            }
        }
        kind.unwrap_or(ColumnKind::Categorical)
    }

    /// Ordered columns get a range control instead of a multi-select.
    pub fn is_ordered(self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::Date)
    }
}

/// A column name plus its inferred kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}
