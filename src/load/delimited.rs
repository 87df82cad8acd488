use csv::ReaderBuilder;
use std::io::Read;
use tracing::trace;

use super::{cell::text_cell, LoadError};
use crate::store::Value;

/// Read every record of a delimited text source as raw text cells. No header
/// handling here: the first record is just another row.
pub(crate) fn read_grid<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Vec<Value>>, LoadError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // ragged rows are padded later
        .delimiter(delimiter)
        .from_reader(reader);

    let mut grid = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        trace!(record = idx, fields = record.len(), "read record");
        grid.push(record.iter().map(text_cell).collect());
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_records_and_blank_cells() {
        let text = "a;b;c\n1;;x\n2\n";
        let grid = read_grid(text.as_bytes(), b';').unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[1], vec![Value::text("1"), Value::Missing, Value::text("x")]);
        assert_eq!(grid[2], vec![Value::text("2")]);
    }

    #[test]
    fn quoted_fields_keep_delimiters() {
        let text = "name,notes\n\"Acme, Inc\",\"said \"\"hi\"\"\"\n";
        let grid = read_grid(text.as_bytes(), b',').unwrap();
        assert_eq!(grid[1][0], Value::text("Acme, Inc"));
        assert_eq!(grid[1][1], Value::text("said \"hi\""));
    }
}
