use chrono::{Days, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::store::Value;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Markers read as missing in text sources.
const NA_MARKERS: &[&str] = &[
    "#N/A", "#NA", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A raw text cell; blank text and NA markers are missing.
pub fn text_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NA_MARKERS.contains(&trimmed) {
        Value::Missing
    } else {
        Value::text(raw)
    }
}

/// Parse a cleaned numeric string; NaN is rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = clean_str(raw);
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| !n.is_nan())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    let s = clean_str(raw);
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
];

// Month-first before day-first for slash dates.
const DATE_FORMATS: &[&str] = &[
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %B %Y",
];

/// Strict ISO-style parse: `YYYY-MM-DD`, optionally with a time. Used for
/// type inference, where a false positive would silently retype a column.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDateTime> {
    let s = clean_str(raw);
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_time(NaiveTime::MIN));
    }
    ISO_DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

/// Lenient parse for declared date columns: ISO first, then the common
/// spreadsheet layouts.
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    if let Some(dt) = parse_iso_date(raw) {
        return Some(dt);
    }
    let s = clean_str(raw);
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Excel 1900-system serial (days since 1899-12-30, fraction = time of day).
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 2958465 is 9999-12-31
    if !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let days = serial.floor();
    let secs = ((serial - days) * 86_400.0).round() as i64;
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch
        .checked_add_days(Days::new(days as u64))?
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::seconds(secs))
}

/// Declared numeric column: unparseable → missing.
pub fn coerce_numeric(value: Value) -> Value {
    match value {
        Value::Number(_) | Value::Missing => value,
        Value::Text(s) => parse_number(&s).map_or(Value::Missing, Value::number),
        Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
        Value::Date(_) => Value::Missing,
    }
}

/// Declared date column: numbers are Excel serials, text is parsed,
/// anything else → missing.
pub fn coerce_date(value: Value) -> Value {
    match value {
        Value::Date(_) | Value::Missing => value,
        Value::Number(n) => excel_serial_to_datetime(n).map_or(Value::Missing, Value::Date),
        Value::Text(s) => parse_date(&s).map_or(Value::Missing, Value::Date),
        Value::Bool(_) => Value::Missing,
    }
}
