//! Minimal xlsx sheet reader: resolves the requested sheet through the
//! workbook relationships and turns its cells into typed values, using the
//! shared string table and the cell styles (for date detection).

use roxmltree::{Document, Node};
use std::io::{Read, Seek};
use tracing::debug;
use zip::{result::ZipError, ZipArchive};

use super::{cell, LoadError};
use crate::store::Value;

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

// Spreadsheet limits; cell references beyond these are malformed.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

/// Names of the sheets in workbook order.
pub fn sheet_names<R: Read + Seek>(reader: R) -> Result<Vec<String>, LoadError> {
    let mut archive = ZipArchive::new(reader)?;
    let workbook = required_part(&mut archive, "xl/workbook.xml")?;
    Ok(parse_sheet_list(&workbook)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

/// Read one sheet (by name, or the first one) into a grid of cells. Row `i`
/// of the grid is spreadsheet row `i + 1`; gaps become empty rows.
pub(crate) fn read_sheet<R: Read + Seek>(
    reader: R,
    sheet: Option<&str>,
) -> Result<Vec<Vec<Value>>, LoadError> {
    let mut archive = ZipArchive::new(reader)?;

    // 1) locate the sheet part
    let workbook = required_part(&mut archive, "xl/workbook.xml")?;
    let sheets = parse_sheet_list(&workbook)?;
    let (name, rel_id) = match sheet {
        Some(wanted) => sheets
            .iter()
            .find(|(n, _)| n == wanted)
            .ok_or_else(|| LoadError::SheetNotFound(wanted.to_string()))?,
        None => sheets
            .first()
            .ok_or_else(|| LoadError::Workbook("workbook lists no sheets".into()))?,
    };
    let rels = required_part(&mut archive, "xl/_rels/workbook.xml.rels")?;
    let target = relationship_target(&rels, rel_id)?;
    let part = resolve_target(&target);
    debug!(sheet = %name, part = %part, "resolved sheet part");

    // 2) lookup tables
    let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let date_styles = match read_part(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_date_styles(&xml)?,
        None => Vec::new(),
    };

    // 3) the cells
    let sheet_xml = required_part(&mut archive, &part)?;
    parse_sheet_data(&sheet_xml, &shared, &date_styles)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, LoadError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| LoadError::Workbook(format!("reading part {name}: {e}")))?;
    Ok(Some(xml))
}

fn required_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, LoadError> {
    read_part(archive, name)?.ok_or_else(|| LoadError::Workbook(format!("missing part {name}")))
}

/// `(sheet name, relationship id)` pairs.
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>, LoadError> {
    let doc = Document::parse(xml)?;
    Ok(doc
        .descendants()
        .filter(|n| n.has_tag_name("sheet"))
        .filter_map(|n| {
            let name = n.attribute("name")?;
            let id = n.attribute((REL_NS, "id"))?;
            Some((name.to_string(), id.to_string()))
        })
        .collect())
}

fn relationship_target(xml: &str, rel_id: &str) -> Result<String, LoadError> {
    let doc = Document::parse(xml)?;
    doc.descendants()
        .filter(|n| n.has_tag_name("Relationship"))
        .find(|n| n.attribute("Id") == Some(rel_id))
        .and_then(|n| n.attribute("Target"))
        .map(str::to_string)
        .ok_or_else(|| LoadError::Workbook(format!("no relationship target for {rel_id}")))
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(abs) => abs.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

/// Text of an `si`/`is` element, skipping phonetic runs.
fn rich_text(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.has_tag_name("t") && !n.ancestors().any(|a| a.has_tag_name("rPh")))
        .filter_map(|n| n.text())
        .collect()
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, LoadError> {
    let doc = Document::parse(xml)?;
    Ok(doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("si"))
        .map(rich_text)
        .collect())
}

/// For each cell format (`cellXfs/xf`, by index): does it display a date?
fn parse_date_styles(xml: &str) -> Result<Vec<bool>, LoadError> {
    let doc = Document::parse(xml)?;
    let custom: Vec<(u32, bool)> = doc
        .descendants()
        .filter(|n| n.has_tag_name("numFmt"))
        .filter_map(|n| {
            let id = n.attribute("numFmtId")?.parse().ok()?;
            Some((id, is_date_format_code(n.attribute("formatCode")?)))
        })
        .collect();

    let Some(cell_xfs) = doc.descendants().find(|n| n.has_tag_name("cellXfs")) else {
        return Ok(Vec::new());
    };
    Ok(cell_xfs
        .children()
        .filter(|n| n.has_tag_name("xf"))
        .map(|xf| {
            let id: u32 = xf
                .attribute("numFmtId")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            match custom.iter().find(|(cid, _)| *cid == id) {
                Some((_, is_date)) => *is_date,
                None => is_builtin_date_format(id),
            }
        })
        .collect())
}

fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 45..=47)
}

/// A custom number format shows a date/time if, outside quoted literals,
/// escapes and bracketed sections, it uses a y/m/d/h/s token.
fn is_date_format_code(code: &str) -> bool {
    let mut chars = code.chars();
    let mut in_quote = false;
    let mut in_bracket = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quote = !in_quote,
            _ if in_quote => {}
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => in_bracket = true,
            ']' => in_bracket = false,
            _ if in_bracket => {}
            c if matches!(c.to_ascii_lowercase(), 'y' | 'm' | 'd' | 'h' | 's') => return true,
            _ => {}
        }
    }
    false
}

/// Zero-based column index of a reference like `AB12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: &str = reference
        .split(|c: char| c.is_ascii_digit())
        .next()
        .filter(|s| !s.is_empty())?;
    let mut idx = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        idx = idx * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
        if idx > MAX_COLUMNS {
            return None;
        }
    }
    Some(idx - 1)
}

fn cell_value(c: Node<'_, '_>, shared: &[String], date_styles: &[bool]) -> Value {
    let raw = c
        .children()
        .find(|n| n.has_tag_name("v"))
        .and_then(|n| n.text());
    match c.attribute("t").unwrap_or("n") {
        "s" => raw
            .and_then(|s| s.trim().parse::<usize>().ok())
            .and_then(|i| shared.get(i))
            .map_or(Value::Missing, |s| cell::text_cell(s)),
        "inlineStr" => c
            .children()
            .find(|n| n.has_tag_name("is"))
            .map_or(Value::Missing, |n| cell::text_cell(&rich_text(n))),
        "str" => raw.map_or(Value::Missing, cell::text_cell),
        "b" => raw.map_or(Value::Missing, |s| Value::Bool(s.trim() == "1")),
        "e" => Value::Missing,
        "d" => raw.map_or(Value::Missing, |s| {
            cell::parse_iso_date(s).map_or_else(|| Value::text(s), Value::Date)
        }),
        _ => {
            let style = c
                .attribute("s")
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(0);
            match raw.and_then(cell::parse_number) {
                Some(n) if date_styles.get(style).copied().unwrap_or(false) => {
                    cell::excel_serial_to_datetime(n).map_or(Value::number(n), Value::Date)
                }
                Some(n) => Value::number(n),
                None => Value::Missing,
            }
        }
    }
}

fn parse_sheet_data(
    xml: &str,
    shared: &[String],
    date_styles: &[bool],
) -> Result<Vec<Vec<Value>>, LoadError> {
    let doc = Document::parse(xml)?;
    let Some(sheet_data) = doc.descendants().find(|n| n.has_tag_name("sheetData")) else {
        return Ok(Vec::new());
    };

    let mut grid: Vec<Vec<Value>> = Vec::new();
    for row in sheet_data.children().filter(|n| n.has_tag_name("row")) {
        let row_idx = match row.attribute("r").and_then(|r| r.parse::<usize>().ok()) {
            Some(r) if (1..=MAX_ROWS).contains(&r) => r - 1,
            Some(r) => {
                return Err(LoadError::Workbook(format!("row reference {r} out of range")));
            }
            None => grid.len(),
        };
        if grid.len() <= row_idx {
            grid.resize_with(row_idx + 1, Vec::new);
        }

        let cells = &mut grid[row_idx];
        for c in row.children().filter(|n| n.has_tag_name("c")) {
            let col = match c.attribute("r") {
                Some(reference) => column_index(reference).ok_or_else(|| {
                    LoadError::Workbook(format!("bad cell reference {reference}"))
                })?,
                None => cells.len(),
            };
            if cells.len() <= col {
                cells.resize(col + 1, Value::Missing);
            }
            cells[col] = cell_value(c, shared, date_styles);
        }
    }
    Ok(grid)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::{Cursor, Write};
    use zip::{write::FileOptions, CompressionMethod, ZipWriter};

    /// Build an in-memory xlsx with the given `(sheet name, sheetData xml)`s.
    pub(crate) fn workbook_bytes(sheets: &[(&str, &str)], shared: &[&str]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buf));
            let options: FileOptions<'_, ()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);

            let sheet_list: String = sheets
                .iter()
                .enumerate()
                .map(|(i, (name, _))| {
                    format!(
                        r#"<sheet name="{name}" sheetId="{id}" r:id="rId{id}"/>"#,
                        id = i + 1
                    )
                })
                .collect();
            zip.start_file("xl/workbook.xml", options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{REL_NS}"><sheets>{sheet_list}</sheets></workbook>"#
            )
            .unwrap();

            let rels: String = (1..=sheets.len())
                .map(|id| {
                    format!(
                        r#"<Relationship Id="rId{id}" Type="{REL_NS}/worksheet" Target="worksheets/sheet{id}.xml"/>"#
                    )
                })
                .collect();
            zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
            )
            .unwrap();

            let si: String = shared
                .iter()
                .map(|s| format!("<si><t>{s}</t></si>"))
                .collect();
            zip.start_file("xl/sharedStrings.xml", options).unwrap();
            write!(
                zip,
                r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{si}</sst>"#
            )
            .unwrap();

            // xf 0 = general, xf 1 = built-in date, xf 2 = custom "dd/mm/yyyy", xf 3 = custom percent
            zip.start_file("xl/styles.xml", options).unwrap();
            zip.write_all(
                br#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="2"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/><numFmt numFmtId="165" formatCode="0.0%"/></numFmts>
<cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs>
<cellXfs count="4"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="164"/><xf numFmtId="165"/></cellXfs>
</styleSheet>"#,
            )
            .unwrap();

            for (i, (_, data)) in sheets.iter().enumerate() {
                zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)
                    .unwrap();
                write!(
                    zip,
                    r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{data}</sheetData></worksheet>"#
                )
                .unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    const DEALS: &str = r#"
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c><c r="D1" t="s"><v>5</v></c></row>
<row r="2"><c r="A2" t="s"><v>3</v></c><c r="B2"><v>12.5</v></c><c r="C2" s="1"><v>45292</v></c><c r="D2" t="b"><v>1</v></c></row>
<row r="4"><c r="A4" t="inlineStr"><is><t>Health</t></is></c><c r="C4" s="2"><v>45300</v></c><c r="D4" t="e"><v>#N/A</v></c></row>
<row r="5"><c r="B5" s="3"><v>0.25</v></c><c r="C5" t="str"><v>pending</v></c></row>
"#;

    #[test]
    fn reads_typed_cells_and_row_gaps() {
        let bytes = workbook_bytes(
            &[("Sheet1", DEALS)],
            &["Sector", "Deal Size", "Contact Date", "Tech", "unused", "Signed"],
        );
        let grid = read_sheet(Cursor::new(bytes), None).unwrap();
        assert_eq!(grid.len(), 5);
        assert_eq!(
            grid[0],
            vec![
                Value::text("Sector"),
                Value::text("Deal Size"),
                Value::text("Contact Date"),
                Value::text("Signed")
            ]
        );
        let jan1 = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            grid[1],
            vec![
                Value::text("Tech"),
                Value::number(12.5),
                Value::Date(jan1),
                Value::Bool(true)
            ]
        );
        assert!(grid[2].is_empty());
        assert_eq!(grid[3][0], Value::text("Health"));
        assert_eq!(grid[3][1], Value::Missing);
        assert!(matches!(grid[3][2], Value::Date(_)));
        assert_eq!(grid[3][3], Value::Missing);
        // percent style is not a date
        assert_eq!(grid[4][1], Value::number(0.25));
        assert_eq!(grid[4][2], Value::text("pending"));
    }

    #[test]
    fn selects_sheet_by_name() {
        let bytes = workbook_bytes(
            &[
                ("Summary", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>x</t></is></c></row>"#),
                ("Sheet2", r#"<row r="1"><c r="A1" t="inlineStr"><is><t>y</t></is></c></row>"#),
            ],
            &[],
        );
        let grid = read_sheet(Cursor::new(bytes.clone()), Some("Sheet2")).unwrap();
        assert_eq!(grid[0][0], Value::text("y"));

        assert_eq!(
            sheet_names(Cursor::new(bytes.clone())).unwrap(),
            vec!["Summary", "Sheet2"]
        );

        let err = read_sheet(Cursor::new(bytes), Some("Sheet9")).unwrap_err();
        assert!(matches!(err, LoadError::SheetNotFound(ref s) if s == "Sheet9"));
    }

    #[test]
    fn not_a_zip_is_a_load_error() {
        let err = read_sheet(Cursor::new(b"definitely not a workbook".to_vec()), None).unwrap_err();
        assert!(matches!(err, LoadError::Zip(_)));
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn date_format_codes() {
        assert!(is_date_format_code("dd/mm/yyyy"));
        assert!(is_date_format_code("[$-409]mmm d, yyyy;@"));
        assert!(is_date_format_code("h:mm AM/PM"));
        assert!(!is_date_format_code("0.00%"));
        assert!(!is_date_format_code("#,##0 \"days\""));
        assert!(!is_date_format_code("[Red]0.00"));
        assert!(!is_date_format_code("General"));
    }
}
