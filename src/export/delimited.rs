use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::{io::Write, path::Path};
use tracing::info;

use super::{temp_file_for, ExportFormat};
use crate::store::{FilteredView, Value};

/// Header row, then every row of the view in view order. Missing values are
/// empty fields; everything else uses its display form.
pub fn write_csv<W: Write>(view: &FilteredView<'_>, writer: W, delimiter: u8) -> Result<usize> {
    let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
    let set = view.record_set();

    wtr.write_record(set.column_names())
        .context("writing header row")?;
    for row in view.rows() {
        wtr.write_record(row.values().iter().map(field))
            .context("writing record")?;
    }
    wtr.flush().context("flushing delimited output")?;
    Ok(view.len())
}

fn field(value: &Value) -> String {
    match value {
        Value::Missing => String::new(),
        v => v.to_string(),
    }
}

/// Write the view to `path` atomically (temp file, then rename).
pub fn export_csv(view: &FilteredView<'_>, path: &Path) -> Result<usize> {
    let delimiter = match ExportFormat::detect(path) {
        ExportFormat::Delimited(d) => d,
        ExportFormat::Parquet => b',',
    };
    let mut tmp = temp_file_for(path)
        .with_context(|| format!("creating temp file for {}", path.display()))?;
    let rows = write_csv(view, tmp.as_file_mut(), delimiter)?;
    tmp.persist(path)
        .with_context(|| format!("renaming export into {}", path.display()))?;
    info!(rows, path = %path.display(), "exported delimited text");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{self, Source};
    use crate::store::{FilterSelection, RecordSet, Selection};
    use chrono::NaiveDate;

    fn deals() -> RecordSet {
        let signed = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        RecordSet::new(
            vec!["Client".into(), "Sector".into(), "Fund Size".into(), "Signed".into()],
            vec![
                vec!["Acme, Inc".into(), "Tech".into(), 1200.0.into(), signed.into()],
                vec!["Borealis".into(), "Health".into(), Value::Missing, Value::Missing],
                vec!["Cobalt".into(), "Tech".into(), 2.5.into(), Value::Missing],
            ],
        )
    }

    #[test]
    fn writes_header_and_display_values() {
        let set = deals();
        let mut out = Vec::new();
        let rows = write_csv(&set.view(), &mut out, b',').unwrap();
        assert_eq!(rows, 3);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Client,Sector,Fund Size,Signed");
        assert_eq!(lines[1], "\"Acme, Inc\",Tech,1200,2024-02-01");
        assert_eq!(lines[2], "Borealis,Health,,");
        assert_eq!(lines[3], "Cobalt,Tech,2.5,");
    }

    #[test]
    fn filtered_export_reloads_with_same_rows() {
        let set = deals();
        let view = set.apply_filters(
            &FilterSelection::new().with("Sector", Selection::values(["Tech"])),
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tech.csv");
        assert_eq!(export_csv(&view, &path).unwrap(), 2);

        let reloaded = load::load(&Source::new(&path).dates(["Signed"])).unwrap();
        assert_eq!(reloaded.len(), view.len());
        for (a, b) in view.rows().zip(reloaded.view().rows()) {
            assert_eq!(a.values(), b.values());
        }
    }

    #[test]
    fn phone_numbers_survive_export_and_reload() {
        let set = RecordSet::new(
            vec!["Client".into(), "Phone No".into()],
            vec![
                vec!["Acme".into(), "09876543210".into()],
                vec!["Borealis".into(), "9123456780".into()],
            ],
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.csv");
        export_csv(&set.view(), &path).unwrap();

        let reloaded = load::load(&Source::new(&path)).unwrap();
        assert_eq!(
            reloaded.row(0).unwrap().get("Phone No"),
            Some(&Value::text("09876543210"))
        );
        assert_eq!(
            reloaded.row(1).unwrap().get("Phone No"),
            Some(&Value::text("9123456780"))
        );
    }

    #[test]
    fn tsv_extension_uses_tabs() {
        let set = deals();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deals.tsv");
        export_csv(&set.view(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Client\tSector\tFund Size\tSigned\n"));
    }
}
