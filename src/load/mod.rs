// src/load/mod.rs
//
// Source → RecordSet. Reads a raw grid (xlsx sheet or delimited text), takes
// the header row, drops fully empty rows and coerces column types.

pub mod cell;
pub mod delimited;
pub mod xlsx;

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::store::{RecordSet, Value};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed delimited text: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed workbook archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed workbook xml: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("malformed workbook: {0}")]
    Workbook(String),
    #[error("sheet `{0}` not found in workbook")]
    SheetNotFound(String),
    #[error("delimiter {0:?} is not a single ASCII character")]
    InvalidDelimiter(char),
    #[error("source has no columns")]
    NoColumns,
}

/// Where a record set comes from and how to type it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub path: PathBuf,
    /// Sheet name for workbooks; the first sheet when unset.
    pub sheet: Option<String>,
    /// Rows discarded before the header row.
    pub skip_rows: usize,
    /// Delimited text only; defaults from the extension.
    pub delimiter: Option<char>,
    /// Columns coerced to numbers.
    pub numeric: Vec<String>,
    /// Columns coerced to dates.
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Workbook,
    Delimited(u8),
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("xlsx") | Some("xlsm") => SourceFormat::Workbook,
            Some("tsv") | Some("tab") => SourceFormat::Delimited(b'\t'),
            _ => SourceFormat::Delimited(b','),
        }
    }
}

impl Source {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = rows;
        self
    }

    pub fn numeric<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numeric.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn dates<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dates.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn format(&self) -> SourceFormat {
        SourceFormat::detect(&self.path)
    }

    fn delimiter_byte(&self, default: u8) -> Result<u8, LoadError> {
        match self.delimiter {
            None => Ok(default),
            Some(c) if c.is_ascii() => Ok(c as u8),
            Some(c) => Err(LoadError::InvalidDelimiter(c)),
        }
    }
}

/// Load the record set described by `source`.
#[tracing::instrument(level = "info", skip(source), fields(path = %source.path.display()))]
pub fn load(source: &Source) -> Result<RecordSet, LoadError> {
    let start = Instant::now();
    let file = File::open(&source.path).map_err(|e| LoadError::Io {
        path: source.path.clone(),
        source: e,
    })?;
    let set = match source.format() {
        SourceFormat::Workbook => load_workbook(BufReader::new(file), source)?,
        SourceFormat::Delimited(_) => load_delimited(BufReader::new(file), source)?,
    };
    info!(
        rows = set.len(),
        columns = set.columns().len(),
        elapsed = ?start.elapsed(),
        "loaded record set"
    );
    Ok(set)
}

/// Load delimited text from any reader; `source.path` only picks the default
/// delimiter.
pub fn load_delimited<R: Read>(reader: R, source: &Source) -> Result<RecordSet, LoadError> {
    let default = match source.format() {
        SourceFormat::Delimited(d) => d,
        SourceFormat::Workbook => b',',
    };
    let grid = delimited::read_grid(reader, source.delimiter_byte(default)?)?;
    build_record_set(grid, source, true)
}

/// Load an xlsx workbook from any seekable reader.
pub fn load_workbook<R: Read + Seek>(reader: R, source: &Source) -> Result<RecordSet, LoadError> {
    let grid = xlsx::read_sheet(reader, source.sheet.as_deref())?;
    build_record_set(grid, source, false)
}

/// Header row, empty-row dropping and coercion. `infer_text` is set for
/// sources whose cells all arrive as text.
fn build_record_set(
    grid: Vec<Vec<Value>>,
    source: &Source,
    infer_text: bool,
) -> Result<RecordSet, LoadError> {
    let mut rows = grid.into_iter().skip(source.skip_rows);
    let header = rows.next().unwrap_or_default();

    // 1) keep rows with at least one value
    let total_before = rows.len();
    let body: Vec<Vec<Value>> = rows
        .filter(|r| r.iter().any(|v| !v.is_missing()))
        .collect();
    debug!(
        dropped = total_before - body.len(),
        kept = body.len(),
        "dropped empty rows"
    );

    // 2) header names; trailing blank header cells only count when data reaches them
    let named = header
        .iter()
        .rposition(|v| !v.is_missing())
        .map_or(0, |i| i + 1);
    let width = body.iter().map(Vec::len).fold(named, usize::max);
    if width == 0 {
        return Err(LoadError::NoColumns);
    }
    let headers = header_names(&header, width);

    // 3) column typing
    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(body.len()); width];
    for mut row in body {
        row.resize(width, Value::Missing);
        for (col, v) in columns.iter_mut().zip(row) {
            col.push(v);
        }
    }

    let numeric: HashSet<&str> = source.numeric.iter().map(String::as_str).collect();
    let dates: HashSet<&str> = source.dates.iter().map(String::as_str).collect();
    for declared in numeric.iter().chain(dates.iter()) {
        if !headers.iter().any(|h| h == declared) {
            warn!(column = %declared, "declared column not present in source; ignored");
        }
    }

    for (name, col) in headers.iter().zip(columns.iter_mut()) {
        if numeric.contains(name.as_str()) {
            coerce_column(name, col, cell::coerce_numeric);
        } else if dates.contains(name.as_str()) {
            coerce_column(name, col, cell::coerce_date);
        } else if infer_text {
            infer_column(name, col);
        }
    }

    // 4) back to rows
    let n_rows = columns.first().map_or(0, Vec::len);
    let mut out: Vec<Vec<Value>> = (0..n_rows).map(|_| Vec::with_capacity(width)).collect();
    for col in columns {
        for (row, v) in out.iter_mut().zip(col) {
            row.push(v);
        }
    }
    Ok(RecordSet::new(headers, out))
}

/// Blank → `Unnamed: {i}`, duplicates → `name.1`, `name.2`, ...
fn header_names(header: &[Value], width: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(width);
    for i in 0..width {
        let base = match header.get(i) {
            Some(v) if !v.is_missing() => v
                .to_string()
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string(),
            _ => format!("Unnamed: {i}"),
        };
        let mut name = base.clone();
        let mut n = 0;
        while seen.contains(&name) {
            n += 1;
            name = format!("{base}.{n}");
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}

fn coerce_column(name: &str, col: &mut [Value], coerce: fn(Value) -> Value) {
    let mut failed = 0usize;
    for v in col.iter_mut() {
        let was_present = !v.is_missing();
        *v = coerce(std::mem::replace(v, Value::Missing));
        if was_present && v.is_missing() {
            failed += 1;
        }
    }
    if failed > 0 {
        warn!(column = %name, failed, "unparseable values set to missing");
    }
}

/// Digit strings such as "007" or "09876543210" (phone numbers, codes).
fn has_leading_zero(s: &str) -> bool {
    s.len() > 1 && s.starts_with('0') && s.bytes().all(|b| b.is_ascii_digit())
}

/// Retype an all-text column when every value agrees: numbers, then strict
/// ISO dates, then booleans. A column holding any leading-zero digit string
/// stays text unless declared numeric.
fn infer_column(name: &str, col: &mut [Value]) {
    fn texts(col: &[Value]) -> impl Iterator<Item = &str> {
        col.iter().filter_map(Value::as_str)
    }
    if texts(col).next().is_none() {
        return;
    }
    if texts(col).any(has_leading_zero) {
        debug!(column = %name, "leading zeros, kept as text");
        return;
    }
    if texts(col).all(|s| cell::parse_number(s).is_some()) {
        debug!(column = %name, "inferred numeric");
        coerce_column(name, col, cell::coerce_numeric);
    } else if texts(col).all(|s| cell::parse_iso_date(s).is_some()) {
        debug!(column = %name, "inferred date");
        coerce_column(name, col, cell::coerce_date);
    } else if texts(col).all(|s| cell::parse_bool(s).is_some()) {
        debug!(column = %name, "inferred boolean");
        for v in col.iter_mut() {
            if let Some(b) = v.as_str().and_then(cell::parse_bool) {
                *v = Value::Bool(b);
            }
        }
    }
}
