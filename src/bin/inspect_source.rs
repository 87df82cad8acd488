use std::{env, path::Path, process::exit};
use tabdash::{
    load::{self, xlsx, Source, SourceFormat},
    store::ColumnKind,
};

fn main() {
    // Expect a source file and, for workbooks, an optional sheet name.
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <SOURCE_FILE> [SHEET]", args[0]);
        exit(1);
    }
    let mut source = Source::new(&args[1]);
    if let Some(sheet) = args.get(2) {
        source = source.sheet(sheet.as_str());
    }
    if let Err(e) = inspect(&source) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

/// Print sheet names (workbooks), then the column descriptors and row count.
fn inspect(source: &Source) -> anyhow::Result<()> {
    let path: &Path = &source.path;
    println!("=== Source: {} ===", path.display());

    if source.format() == SourceFormat::Workbook {
        let file = std::fs::File::open(path)?;
        let sheets = xlsx::sheet_names(std::io::BufReader::new(file))?;
        println!("Sheets:               {}", sheets.join(", "));
    }

    let set = load::load(source)?;
    println!("Rows:                 {}", set.len());
    println!("Columns:              {}", set.columns().len());
    println!();

    println!("=== Columns ===");
    for col in set.columns() {
        let distinct = set.distinct_values(&col.name)?;
        let missing = set.view().column_values(&col.name)?.filter(|v| v.is_missing()).count();
        let kind = match col.kind {
            ColumnKind::Categorical => "categorical",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Date => "date",
        };
        print!(
            "- {:<30} | {:<11} | distinct: {:<6} | missing: {:<6}",
            col.name,
            kind,
            distinct.len(),
            missing
        );
        match (distinct.first(), distinct.last()) {
            (Some(lo), Some(hi)) if col.kind.is_ordered() => println!(" | range: {} .. {}", lo, hi),
            _ => println!(),
        }
    }
    Ok(())
}
