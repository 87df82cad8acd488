pub mod config;
pub mod dashboard;
pub mod export;
pub mod load;
pub mod store;

pub use dashboard::{Dashboard, Render};
pub use load::{load, LoadError, Source};
pub use store::{
    Aggregator, FilterSelection, FilteredView, RecordSet, Selection, StoreError, Value,
};
