//! Raw rows in, matched operations and KPIs out.
//!
//! This is the only entry point most callers need:
//! rows → [`RecordFilter`] → optional dedupe → [`fifo::match_trades`] → [`performance::summarize`]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ReconcileConfig;
use crate::fifo::{self, OpenPosition, Operation};
use crate::performance::{self, PerformanceSummary};
use crate::records::{RawRow, RecordFilter, RejectReason, Side, TradeRecord};

/// Counters describing what happened to the input rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub rows_read: usize,
    pub records_accepted: usize,
    pub missing_ticker: usize,
    pub header_echoes: usize,
    pub zero_quantity: usize,
    pub not_executed: usize,
    pub duplicates_removed: usize,
}

impl ImportStats {
    fn record_rejection(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::MissingTicker => self.missing_ticker += 1,
            RejectReason::HeaderEcho(_) => self.header_echoes += 1,
            RejectReason::ZeroQuantity => self.zero_quantity += 1,
            RejectReason::Status(_) => self.not_executed += 1,
        }
    }
}

/// Everything derived from one batch of rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    /// Sorted by exit date
    pub operations: Vec<Operation>,
    /// `None` when no operation closed
    pub summary: Option<PerformanceSummary>,
    pub open_positions: Vec<OpenPosition>,
    pub stats: ImportStats,
}

/// Normalize and match with the default configuration
pub fn normalize_and_match(rows: &[RawRow]) -> MatchOutcome {
    normalize_and_match_with(rows, &ReconcileConfig::default())
}

pub fn normalize_and_match_with(rows: &[RawRow], config: &ReconcileConfig) -> MatchOutcome {
    let filter = RecordFilter::from_config(config);
    let (mut records, mut stats) = normalize_rows(rows, &filter);

    if config.dedupe_identical_records {
        stats.duplicates_removed = dedupe_records(&mut records);
    }
    stats.records_accepted = records.len();

    let matched = fifo::match_trades(&records);
    let summary = performance::summarize(&matched.operations);

    log::info!(
        "Reconciled {} rows: {} trades, {} operations, {} open positions",
        stats.rows_read,
        stats.records_accepted,
        matched.operations.len(),
        matched.open_positions.len()
    );

    MatchOutcome {
        operations: matched.operations,
        summary,
        open_positions: matched.open_positions,
        stats,
    }
}

/// Turn rows into trade records, counting the ones that were dropped
pub fn normalize_rows(rows: &[RawRow], filter: &RecordFilter) -> (Vec<TradeRecord>, ImportStats) {
    let mut stats = ImportStats {
        rows_read: rows.len(),
        ..Default::default()
    };
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        match filter.to_trade_record(row) {
            Ok(record) => records.push(record),
            Err(reason) => {
                log::debug!("Row {} skipped: {}", index + 1, reason);
                stats.record_rejection(&reason);
            }
        }
    }

    (records, stats)
}

#[derive(PartialEq, Eq, Hash)]
struct DedupeKey<'a> {
    account: &'a str,
    ticker: &'a str,
    side: Side,
    quantity: u64,
    price: u64,
    date_time: NaiveDateTime,
}

/// Drop records identical to an earlier one, returning how many were dropped
fn dedupe_records(records: &mut Vec<TradeRecord>) -> usize {
    let before = records.len();
    let mut keep = Vec::with_capacity(before);
    {
        let mut seen: HashSet<DedupeKey<'_>> = HashSet::new();
        for record in records.iter() {
            keep.push(seen.insert(DedupeKey {
                account: &record.account,
                ticker: &record.ticker,
                side: record.side,
                quantity: record.quantity.to_bits(),
                price: record.avg_price.to_bits(),
                date_time: record.date_time,
            }));
        }
    }

    let mut flags = keep.into_iter();
    records.retain(|_| flags.next().unwrap_or(true));

    let removed = before - records.len();
    if removed > 0 {
        log::info!("Removed {} duplicate trades", removed);
    }
    removed
}
