//! labor-pulse CLI: load a dataset, apply the dashboard filters and print
//! chart data or the filtered rows.
//!
//! ```bash
//! # charts of one menu entry, as JSON
//! labor-pulse --chart theme:shift-synergy --filter Department=Assembly
//!
//! # filtered rows as a table
//! labor-pulse --file plant.xlsx --start 2024-01-01 --end 2024-03-31 --format table
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use labor_pulse::catalogue::{ChartOptions, ChartSelection};
use labor_pulse::data::derive::{DerivedColumn, Granularity};
use labor_pulse::data::export::to_record_batch;
use labor_pulse::data::filter::{DateRange, ValueRange};
use labor_pulse::data::loader::{self, DataSource};
use labor_pulse::state::Session;
use labor_pulse::{CategoricalColumn, DashboardConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

/// Filter a labor-productivity dataset and compute dashboard chart data
#[derive(Parser, Debug)]
#[command(name = "labor-pulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Filter a labor-productivity dataset and compute dashboard chart data")]
#[command(long_about = None)]
struct Cli {
    /// Dataset to load (.xlsx or .csv); the configured default otherwise
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// First date to keep (YYYY-MM-DD)
    #[arg(short = 's', long)]
    start: Option<NaiveDate>,

    /// Last date to keep (YYYY-MM-DD)
    #[arg(short = 'e', long)]
    end: Option<NaiveDate>,

    /// Categorical restriction, e.g. Department=Assembly (repeatable)
    #[arg(long = "filter", value_name = "COLUMN=VALUE", value_parser = parse_filter)]
    filters: Vec<(CategoricalColumn, String)>,

    /// Efficiency rate range, e.g. 60:95
    #[arg(long, value_name = "LOW:HIGH", value_parser = parse_range)]
    efficiency: Option<(f64, f64)>,

    /// Chart selection, e.g. metric:labor-presence
    #[arg(long)]
    chart: Option<ChartSelection>,

    /// Interval for time-based charts (week, month, year)
    #[arg(short, long)]
    granularity: Option<Granularity>,

    /// List chart selections and column values, then exit
    #[arg(long)]
    list: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: OutputFormat,
}

fn parse_filter(s: &str) -> std::result::Result<(CategoricalColumn, String), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{s}'"))?;
    let column = CategoricalColumn::from_str(column).map_err(|e| e.to_string())?;
    Ok((column, value.to_string()))
}

fn parse_range(s: &str) -> std::result::Result<(f64, f64), String> {
    let (low, high) = s
        .split_once(':')
        .ok_or_else(|| format!("expected LOW:HIGH, got '{s}'"))?;
    Ok((parse_number(low)?, parse_number(high)?))
}

fn parse_number(s: &str) -> std::result::Result<f64, String> {
    s.trim().parse::<f64>().map_err(|e| format!("'{s}': {e}"))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = DashboardConfig::load(cli.config.as_deref())?;
    let source = match &cli.file {
        Some(path) => DataSource::Upload {
            name: path.display().to_string(),
            bytes: std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        },
        None => DataSource::Default,
    };
    let table = loader::load(&source, &config)?;

    let mut options = ChartOptions::from(&config);
    if let Some(g) = cli.granularity {
        options.granularity = g;
    }
    let mut session = Session::new(table).with_options(options);

    if cli.list {
        return list(&session);
    }

    let mut filters = session.filters().clone();
    if cli.start.is_some() || cli.end.is_some() {
        let observed = filters.date_range;
        let (Some(start), Some(end)) = (
            cli.start.or(observed.map(|r| r.start)),
            cli.end.or(observed.map(|r| r.end)),
        ) else {
            bail!("the dataset has no dates to complete the date range");
        };
        filters.date_range = Some(DateRange::new(start, end));
    }
    if let Some((low, high)) = cli.efficiency {
        filters.efficiency_rate_range = Some(ValueRange::new(low, high));
    }
    let mut allowed: BTreeMap<CategoricalColumn, BTreeSet<String>> = BTreeMap::new();
    for (column, value) in cli.filters {
        allowed.entry(column).or_default().insert(value);
    }
    filters.allowed.extend(allowed);
    session.set_filters(filters)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.format {
        OutputFormat::Json => {
            if let Some(selection) = cli.chart {
                session.set_selection(selection);
            }
            let charts = session.charts()?;
            serde_json::to_writer_pretty(&mut out, &charts)?;
            writeln!(out)?;
        }
        OutputFormat::Table => {
            let view = session.view()?;
            let batch = to_record_batch(&view, &[DerivedColumn::TargetProductivity])?;
            writeln!(out, "{}", pretty_format_batches(&[batch])?)?;
        }
    }
    Ok(())
}

fn list(session: &Session) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "Chart selections:")?;
    for selection in ChartSelection::all() {
        writeln!(out, "  {selection}")?;
    }

    let table = session.table();
    if let Some((lo, hi)) = table.date_bounds() {
        writeln!(out, "\nDates: {lo} to {hi}")?;
    }
    for (column, values) in &table.unique_values {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        writeln!(out, "{column}: {}", values.join(", "))?;
    }
    Ok(())
}
