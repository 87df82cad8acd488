//! Export of a filtered view: delimited text for spreadsheet users, Arrow /
//! Parquet for anything downstream.

pub mod columnar;
pub mod delimited;

use anyhow::Result;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::store::FilteredView;

pub use columnar::{export_parquet, to_record_batch};
pub use delimited::{export_csv, write_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Delimited(u8),
    Parquet,
}

impl ExportFormat {
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("parquet") => ExportFormat::Parquet,
            Some("tsv") | Some("tab") => ExportFormat::Delimited(b'\t'),
            _ => ExportFormat::Delimited(b','),
        }
    }
}

/// Export `view` to `path`, picking the format from the extension.
pub fn export(view: &FilteredView<'_>, path: &Path) -> Result<usize> {
    match ExportFormat::detect(path) {
        ExportFormat::Parquet => export_parquet(view, path),
        ExportFormat::Delimited(_) => export_csv(view, path),
    }
}

/// Temp file next to `path`, so the final rename stays on one filesystem.
pub(crate) fn temp_file_for(path: &Path) -> std::io::Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(dir)
}
