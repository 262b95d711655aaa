//! Performance summary over closed operations
//!
//! A pure reduction, recomputed from scratch whenever the operation set
//! changes:
//!
//! ```text
//! total_result   = Σ result_value
//! total_volume   = Σ volume
//! win_rate       = count(result_value > 0) / count × 100
//! avg_return     = mean(result_percent)
//! weighted_avg   = Σ(result_percent × volume) / Σ volume      (0 if Σ volume = 0)
//! ```
//!
//! ## Max drawdown
//!
//! Operations are walked in exit order, accumulating realized equity from 0:
//!
//! ```text
//! equity_i   = equity_(i-1) + result_value_i
//! peak_i     = max(peak_(i-1), equity_i)
//! drawdown_i = (peak_i - equity_i) / peak_i      (only while peak_i > 0)
//! ```
//!
//! The summary reports `max(drawdown_i) × 100`. Since equity starts at zero
//! rather than at invested capital, the figure can exceed 100% once realized
//! equity turns negative after a positive peak.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fifo::Operation;

/// Portfolio KPIs for a set of closed operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub operation_count: usize,
    pub winning_operations: usize,
    pub losing_operations: usize,
    pub total_result: f64,
    pub total_volume: f64,
    /// Percentage of operations with a positive result
    pub win_rate: f64,
    /// Simple mean of `result_percent`
    pub average_return_percent: f64,
    /// Mean of `result_percent` weighted by operation volume
    pub weighted_average_return_percent: f64,
    pub max_drawdown_percent: f64,
    pub best_result: f64,
    pub worst_result: f64,
    pub average_duration_days: f64,
}

/// Summarize operations given in exit-date order. `None` when empty.
pub fn summarize(operations: &[Operation]) -> Option<PerformanceSummary> {
    if operations.is_empty() {
        return None;
    }

    let count = operations.len();
    let total_result: f64 = operations.iter().map(|op| op.result_value).sum();
    let total_volume: f64 = operations.iter().map(|op| op.volume).sum();
    let winning_operations = operations.iter().filter(|op| op.result_value > 0.0).count();
    let losing_operations = operations.iter().filter(|op| op.result_value < 0.0).count();

    let average_return_percent =
        operations.iter().map(|op| op.result_percent).sum::<f64>() / count as f64;

    let weighted_average_return_percent = if total_volume != 0.0 {
        operations
            .iter()
            .map(|op| op.result_percent * op.volume)
            .sum::<f64>()
            / total_volume
    } else {
        0.0
    };

    let best_result = operations
        .iter()
        .map(|op| op.result_value)
        .fold(f64::NEG_INFINITY, f64::max);
    let worst_result = operations
        .iter()
        .map(|op| op.result_value)
        .fold(f64::INFINITY, f64::min);

    let average_duration_days =
        operations.iter().map(|op| op.duration_days as f64).sum::<f64>() / count as f64;

    Some(PerformanceSummary {
        operation_count: count,
        winning_operations,
        losing_operations,
        total_result,
        total_volume,
        win_rate: winning_operations as f64 / count as f64 * 100.0,
        average_return_percent,
        weighted_average_return_percent,
        max_drawdown_percent: calculate_max_drawdown(operations.iter().map(|op| op.result_value)) * 100.0,
        best_result,
        worst_result,
        average_duration_days,
    })
}

/// One summary per ticker, keyed alphabetically
pub fn summarize_by_ticker(operations: &[Operation]) -> BTreeMap<String, PerformanceSummary> {
    let mut by_ticker: BTreeMap<String, Vec<Operation>> = BTreeMap::new();
    for op in operations {
        by_ticker.entry(op.ticker.clone()).or_default().push(op.clone());
    }

    by_ticker
        .into_iter()
        .filter_map(|(ticker, ops)| summarize(&ops).map(|summary| (ticker, summary)))
        .collect()
}

/// Largest peak-to-trough decline of cumulative realized equity, as a fraction
fn calculate_max_drawdown(results: impl Iterator<Item = f64>) -> f64 {
    let mut equity = 0.0;
    let mut peak = 0.0;
    let mut max_drawdown: f64 = 0.0;

    for result in results {
        equity += result;
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let drawdown = (peak - equity) / peak;
            max_drawdown = max_drawdown.max(drawdown);
        }
    }

    max_drawdown
}
