//! Broker statement normalization and FIFO trade matching.
//!
//! Rows exported by a broker (CSV, spreadsheet or JSON) are normalized into
//! executed trades, paired into closed round trips per (account, ticker) with
//! FIFO lot matching, and summarized into portfolio KPIs.
//!
//! ```no_run
//! use trade_ledger::statement::{read_statement, ReadOptions};
//!
//! let rows = read_statement("orders.csv", &ReadOptions::default())?;
//! let outcome = trade_ledger::normalize_and_match(&rows);
//! println!("{} operations", outcome.operations.len());
//! # Ok::<(), trade_ledger::Error>(())
//! ```

pub mod columns;
pub mod config;
pub mod error;
pub mod fifo;
pub mod parsing;
pub mod performance;
pub mod quotes;
pub mod reconcile;
pub mod records;
pub mod statement;

pub use config::ReconcileConfig;
pub use error::{Error, Result};
pub use fifo::{OpenPosition, Operation, PositionSide};
pub use performance::PerformanceSummary;
pub use reconcile::{normalize_and_match, normalize_and_match_with, ImportStats, MatchOutcome};
pub use records::{CellValue, RawRow, Side, TradeRecord};
