//! In-memory tabular store: an immutable record set, per-column filter
//! selections, filtered views and grouped aggregation over those views.

pub mod aggregate;
pub mod column;
pub mod filter;
pub mod record_set;
pub mod stats;
pub mod value;

pub use aggregate::{
    Aggregator, GroupAggregate, GroupAggregates, GroupCount, PivotTable, Table,
};
pub use column::{ColumnDescriptor, ColumnKind};
pub use filter::{FilterSelection, FilteredView, Selection};
pub use record_set::{RecordSet, Row};
pub use stats::{CorrelationMatrix, GroupSummary, Summary};
pub use value::Value;

/// Errors raised by store queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Callers treat this as "filter/panel not applicable", not as fatal.
    #[error("column `{0}` not found")]
    ColumnNotFound(String),
}
