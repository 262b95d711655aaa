//! Match the trades of a broker statement and print the result as JSON

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trade_ledger::columns::HeaderReport;
use trade_ledger::quotes::{value_positions, PositionValuation, Quote, QuoteCache};
use trade_ledger::statement::{read_statement, ReadOptions};
use trade_ledger::{normalize_and_match_with, MatchOutcome, ReconcileConfig};

#[derive(Parser, Debug)]
#[command(name = "reconcile", about = "Pair executed trades FIFO and summarize the closed operations.")]
struct Args {
    /// Statement to read (.csv, .txt, .xlsx, .xls, .ods or .json)
    input: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worksheet name; defaults to the first sheet
    #[arg(short, long)]
    sheet: Option<String>,

    /// JSON array of last prices (`[{"symbol": "PETR4", "price": 38.5}]`) to value open positions
    #[arg(short, long)]
    quotes: Option<PathBuf>,

    /// Print how the header line resolves instead of matching
    #[arg(long)]
    inspect: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    #[serde(flatten)]
    outcome: MatchOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    valuations: Option<Vec<PositionValuation>>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr, stdout carries the JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = match &args.config {
        Some(path) => {
            ReconcileConfig::from_path(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => ReconcileConfig::default(),
    };

    let mut options = ReadOptions::from_config(&config);
    if let Some(sheet) = &args.sheet {
        options = options.with_sheet(sheet.as_str());
    }

    let rows = read_statement(&args.input, &options).with_context(|| format!("reading {}", args.input.display()))?;

    if args.inspect {
        let headers: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.label.clone()).collect())
            .unwrap_or_default();
        let report: HeaderReport = options.aliases.resolve_headers(&headers);
        return print_json(&report, args.pretty);
    }

    let outcome = normalize_and_match_with(&rows, &config);

    let valuations = match &args.quotes {
        Some(path) => {
            let now = Utc::now();
            let content = std::fs::read_to_string(path).with_context(|| format!("reading quotes {}", path.display()))?;
            let quotes: Vec<Quote> =
                serde_json::from_str(&content).with_context(|| format!("parsing quotes {}", path.display()))?;

            let mut cache = QuoteCache::new(config.quote_ttl());
            for quote in quotes {
                cache.insert(quote, now);
            }
            Some(value_positions(&outcome.open_positions, &cache, now))
        }
        None => None,
    };

    print_json(&Report { outcome, valuations }, args.pretty)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
