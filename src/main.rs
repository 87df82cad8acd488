use anyhow::{bail, Context, Result};
use std::{env, path::PathBuf, process::exit};
use tabdash::{
    dashboard::selection::{parse_range, parse_values, read_selection},
    export, Dashboard, FilterSelection,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "Usage: tabdash <dashboard.yaml> [--select COL=V1,V2]... \
[--range COL=LO..HI]... [--selection file.json] [--export out.csv|out.parquet] [--controls]";

#[derive(Debug, Default)]
struct Args {
    definition: PathBuf,
    selects: Vec<String>,
    ranges: Vec<String>,
    selection_file: Option<PathBuf>,
    export: Option<PathBuf>,
    controls: bool,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    let mut definition = None;
    while let Some(arg) = raw.next() {
        let mut value = |flag: &str| {
            raw.next()
                .with_context(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--select" => args.selects.push(value("--select")?),
            "--range" => args.ranges.push(value("--range")?),
            "--selection" => args.selection_file = Some(value("--selection")?.into()),
            "--export" => args.export = Some(value("--export")?.into()),
            "--controls" => args.controls = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ if definition.is_none() => definition = Some(PathBuf::from(&arg)),
            _ => bail!("unexpected argument {arg}"),
        }
    }
    args.definition = definition.context("missing dashboard definition")?;
    Ok(args)
}

fn main() {
    // ─── 1) init logging (stderr; stdout carries the JSON) ───────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            exit(2);
        }
    };

    if let Err(e) = run(args) {
        error!("{e:#}");
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    // ─── 2) load once ────────────────────────────────────────────────
    let dashboard = Dashboard::open(&args.definition)?;
    info!(
        title = %dashboard.config().title,
        rows = dashboard.records().len(),
        "dashboard ready"
    );

    if args.controls {
        println!("{}", serde_json::to_string_pretty(&dashboard.filter_controls())?);
        return Ok(());
    }

    // ─── 3) build the selection: file first, flags override ──────────
    let mut selection = match &args.selection_file {
        Some(path) => read_selection(dashboard.records(), path)?,
        None => FilterSelection::new(),
    };
    for arg in &args.selects {
        let (column, sel) = parse_values(dashboard.records(), arg)?;
        selection.set(column, sel);
    }
    for arg in &args.ranges {
        let (column, sel) = parse_range(dashboard.records(), arg)?;
        selection.set(column, sel);
    }

    // ─── 4) render + optional export ─────────────────────────────────
    let render = dashboard.render(&selection);
    println!("{}", serde_json::to_string_pretty(&render)?);

    if let Some(path) = &args.export {
        let rows = export::export(&dashboard.view(&selection), path)
            .with_context(|| format!("exporting to {}", path.display()))?;
        info!(rows, path = %path.display(), "export done");
    }
    Ok(())
}
