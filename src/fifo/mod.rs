//! FIFO (First-In-First-Out) trade matching
//!
//! Pairs executed trades into closed round trips per (account, ticker):
//! - BUY: Closes open short lots oldest-first, the remainder opens a long lot
//! - SELL: Closes open long lots oldest-first, the remainder opens a short lot
//!
//! Trades are ordered by execution time with a stable sort, so trades sharing
//! a timestamp are matched in file order. Same-timestamp buys and sells that a
//! broker reports in a different order than they settled will attribute P&L
//! differently than the broker does.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use crate::records::{Side, TradeRecord};

/// Quantities at or below this are treated as fully consumed
pub const QUANTITY_EPSILON: f64 = 1e-9;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Unmatched quantity waiting for an opposite trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub quantity: f64,
    pub price: f64,
    pub date: NaiveDate,
    pub date_time: NaiveDateTime,
    pub client: String,
}

impl Lot {
    fn open(record: &TradeRecord, quantity: f64) -> Self {
        Self {
            quantity,
            price: record.avg_price,
            date: record.date,
            date_time: record.date_time,
            client: record.client.clone(),
        }
    }
}

/// Direction of a closed round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PositionSide {
    /// Bought first, sold later
    Long,
    /// Sold first, bought back later
    Short,
}

/// A closed round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    pub ticker: String,
    pub client: String,
    pub account: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    /// Entry plus exit notional
    pub volume: f64,
    pub result_value: f64,
    pub result_percent: f64,
    pub duration_days: i64,
    pub side: PositionSide,
}

/// Lots still open for one (account, ticker) after matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosition {
    pub account: String,
    pub ticker: String,
    pub client: String,
    pub side: PositionSide,
    pub quantity: f64,
    /// Quantity-weighted price of the open lots
    pub average_price: f64,
    /// Oldest first
    pub lots: Vec<Lot>,
}

impl OpenPosition {
    fn from_lots(account: &str, ticker: &str, side: PositionSide, lots: VecDeque<Lot>) -> Option<Self> {
        if lots.is_empty() {
            return None;
        }
        let quantity: f64 = lots.iter().map(|l| l.quantity).sum();
        let cost: f64 = lots.iter().map(|l| l.quantity * l.price).sum();
        let average_price = if quantity > QUANTITY_EPSILON { cost / quantity } else { 0.0 };
        let client = lots
            .iter()
            .rev()
            .map(|l| l.client.as_str())
            .find(|c| !c.is_empty())
            .unwrap_or_default()
            .to_string();

        Some(Self {
            account: account.to_string(),
            ticker: ticker.to_string(),
            client,
            side,
            quantity,
            average_price,
            lots: lots.into_iter().collect(),
        })
    }
}

/// Outcome of matching one (account, ticker) group
#[derive(Debug, Clone, Default)]
pub struct GroupMatch {
    pub operations: Vec<Operation>,
    pub open_buys: VecDeque<Lot>,
    pub open_sells: VecDeque<Lot>,
}

/// Outcome of matching a whole batch
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Sorted by exit date
    pub operations: Vec<Operation>,
    pub open_positions: Vec<OpenPosition>,
}

// ============================================================================
// Matching
// ============================================================================

/// Match the trades of a single (account, ticker) group
pub fn match_group(account: &str, ticker: &str, records: &[&TradeRecord]) -> GroupMatch {
    let mut ordered: Vec<&TradeRecord> = records.to_vec();
    // Stable: equal timestamps keep file order
    ordered.sort_by_key(|r| r.date_time);

    let mut result = GroupMatch::default();
    let mut sequence: u64 = 0;

    for record in ordered {
        let (book, opposite, closing_side) = match record.side {
            Side::Buy => (&mut result.open_buys, &mut result.open_sells, PositionSide::Short),
            Side::Sell => (&mut result.open_sells, &mut result.open_buys, PositionSide::Long),
        };

        let mut remaining = record.quantity;
        while remaining > QUANTITY_EPSILON {
            let Some(mut lot) = opposite.pop_front() else {
                break;
            };

            let matched = remaining.min(lot.quantity);
            result.operations.push(close_lot(
                account,
                ticker,
                &lot,
                record,
                matched,
                closing_side,
                sequence,
            ));
            sequence += 1;

            remaining -= matched;
            lot.quantity -= matched;
            if lot.quantity > QUANTITY_EPSILON {
                opposite.push_front(lot);
            }
        }

        if remaining > QUANTITY_EPSILON {
            book.push_back(Lot::open(record, remaining));
        }
    }

    log::debug!(
        "FIFO: {}/{} -> {} operations, {} open buy lots, {} open sell lots",
        account,
        ticker,
        result.operations.len(),
        result.open_buys.len(),
        result.open_sells.len()
    );

    result
}

/// Match a batch of trades.
///
/// Trades are grouped per (account, ticker) in order of first appearance and
/// each group is matched independently. Operations come back sorted by exit
/// date, then exit time; exact ties keep group order.
pub fn match_trades(records: &[TradeRecord]) -> MatchResult {
    let mut group_index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<((&str, &str), Vec<&TradeRecord>)> = Vec::new();

    for record in records {
        let key = (record.account.as_str(), record.ticker.as_str());
        let index = *group_index.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[index].1.push(record);
    }

    let mut result = MatchResult::default();
    for ((account, ticker), group) in groups {
        let matched = match_group(account, ticker, &group);
        result.operations.extend(matched.operations);

        let open = OpenPosition::from_lots(account, ticker, PositionSide::Long, matched.open_buys)
            .or_else(|| OpenPosition::from_lots(account, ticker, PositionSide::Short, matched.open_sells));
        if let Some(position) = open {
            result.open_positions.push(position);
        }
    }

    result.operations.sort_by_key(|op| (op.exit_date, op.exit_time));
    result
}

fn close_lot(
    account: &str,
    ticker: &str,
    lot: &Lot,
    exit: &TradeRecord,
    quantity: f64,
    side: PositionSide,
    sequence: u64,
) -> Operation {
    let entry_price = lot.price;
    let exit_price = exit.avg_price;

    let result_value = match side {
        PositionSide::Long => (exit_price - entry_price) * quantity,
        PositionSide::Short => (entry_price - exit_price) * quantity,
    };

    let client = if exit.client.is_empty() {
        lot.client.clone()
    } else {
        exit.client.clone()
    };

    Operation {
        id: operation_id(account, ticker, sequence),
        ticker: ticker.to_string(),
        client,
        account: account.to_string(),
        entry_date: lot.date,
        exit_date: exit.date,
        entry_time: lot.date_time,
        exit_time: exit.date_time,
        entry_price,
        exit_price,
        quantity,
        volume: quantity * entry_price + quantity * exit_price,
        result_value,
        result_percent: result_percent(side, entry_price, exit_price),
        duration_days: duration_days(lot.date_time, exit.date_time),
        side,
    }
}

/// Return of a round trip in percent.
///
/// Long: `exit / entry - 1`. Short: `entry / exit - 1`. A zero entry price (or a
/// zero exit price on a short) yields 0 instead of infinity.
pub fn result_percent(side: PositionSide, entry_price: f64, exit_price: f64) -> f64 {
    if entry_price == 0.0 {
        return 0.0;
    }
    let ratio = match side {
        PositionSide::Long => exit_price / entry_price,
        PositionSide::Short if exit_price == 0.0 => return 0.0,
        PositionSide::Short => entry_price / exit_price,
    };
    let percent = (ratio - 1.0) * 100.0;
    if percent.is_finite() {
        percent
    } else {
        0.0
    }
}

/// Whole days between entry and exit, rounded up
pub fn duration_days(entry: NaiveDateTime, exit: NaiveDateTime) -> i64 {
    let millis = (exit - entry).num_milliseconds().abs();
    ((millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY).max(0)
}

/// Stable ID for the n-th operation of a group, identical across re-runs
fn operation_id(account: &str, ticker: &str, sequence: u64) -> String {
    let name = format!("{}\u{1f}{}\u{1f}{}", account, ticker, sequence);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn trade(day: u32, side: Side, quantity: f64, price: f64) -> TradeRecord {
        trade_at("ACC", "XPTO3", day, 0, side, quantity, price)
    }

    fn trade_at(
        account: &str,
        ticker: &str,
        day: u32,
        hour: u32,
        side: Side,
        quantity: f64,
        price: f64,
    ) -> TradeRecord {
        let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        TradeRecord {
            date,
            date_time: date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
            account: account.to_string(),
            client: "Client".to_string(),
            ticker: ticker.to_string(),
            side,
            quantity,
            avg_price: price,
            volume: 0.0,
            status: "Executada".to_string(),
        }
    }

    #[test]
    fn test_fifo_consumes_oldest_lot_first() {
        let trades = vec![
            trade(1, Side::Buy, 100.0, 10.0),
            trade(2, Side::Buy, 100.0, 12.0),
            trade(3, Side::Sell, 150.0, 15.0),
        ];
        let result = match_trades(&trades);

        assert_eq!(result.operations.len(), 2);
        assert_eq!(result.operations[0].quantity, 100.0);
        assert_eq!(result.operations[0].entry_price, 10.0);
        assert_eq!(result.operations[1].quantity, 50.0);
        assert_eq!(result.operations[1].entry_price, 12.0);
        assert!(result.operations.iter().all(|op| op.side == PositionSide::Long));

        // 50 @ 12 stays open
        assert_eq!(result.open_positions.len(), 1);
        let open = &result.open_positions[0];
        assert_eq!(open.side, PositionSide::Long);
        assert_eq!(open.quantity, 50.0);
        assert_eq!(open.average_price, 12.0);
    }

    #[test]
    fn test_partial_lot_returns_to_front() {
        let trades = vec![
            trade(1, Side::Buy, 100.0, 10.0),
            trade(2, Side::Buy, 100.0, 20.0),
            trade(3, Side::Sell, 30.0, 11.0),
            trade(4, Side::Sell, 80.0, 21.0),
        ];
        let result = match_trades(&trades);

        let entries: Vec<(f64, f64)> = result
            .operations
            .iter()
            .map(|op| (op.quantity, op.entry_price))
            .collect();
        assert_eq!(entries, vec![(30.0, 10.0), (70.0, 10.0), (10.0, 20.0)]);
        assert_eq!(result.open_positions[0].quantity, 90.0);
    }

    #[test]
    fn test_short_round_trip() {
        let trades = vec![trade(1, Side::Sell, 100.0, 20.0), trade(6, Side::Buy, 100.0, 15.0)];
        let result = match_trades(&trades);

        assert_eq!(result.operations.len(), 1);
        let op = &result.operations[0];
        assert_eq!(op.side, PositionSide::Short);
        assert_eq!(op.entry_price, 20.0);
        assert_eq!(op.exit_price, 15.0);
        assert_eq!(op.result_value, 500.0);
        assert!((op.result_percent - (20.0 / 15.0 - 1.0) * 100.0).abs() < 1e-9);
        assert_eq!(op.duration_days, 5);
        assert!(result.open_positions.is_empty());
    }

    #[test]
    fn test_buy_flips_short_into_long() {
        let trades = vec![trade(1, Side::Sell, 50.0, 20.0), trade(2, Side::Buy, 80.0, 18.0)];
        let result = match_trades(&trades);

        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.operations[0].quantity, 50.0);
        let open = &result.open_positions[0];
        assert_eq!(open.side, PositionSide::Long);
        assert_eq!(open.quantity, 30.0);
    }

    #[test]
    fn test_zero_entry_price_has_zero_percent() {
        let trades = vec![trade(1, Side::Buy, 10.0, 0.0), trade(2, Side::Sell, 10.0, 5.0)];
        let op = &match_trades(&trades).operations[0];
        assert_eq!(op.result_percent, 0.0);
        assert_eq!(op.result_value, 50.0);

        assert_eq!(result_percent(PositionSide::Short, 10.0, 0.0), 0.0);
        assert_eq!(result_percent(PositionSide::Short, 0.0, 10.0), 0.0);
    }

    #[test]
    fn test_duration_rounds_up() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(duration_days(start, start), 0);
        assert_eq!(duration_days(start, start + chrono::Duration::hours(1)), 1);
        assert_eq!(duration_days(start, start + chrono::Duration::hours(24)), 1);
        assert_eq!(duration_days(start, start + chrono::Duration::hours(25)), 2);
        // Order of arguments doesn't matter
        assert_eq!(duration_days(start + chrono::Duration::hours(49), start), 3);
    }

    #[test]
    fn test_same_timestamp_keeps_input_order() {
        // Sell listed before buy at the same instant opens a short first
        let trades = vec![trade(1, Side::Sell, 10.0, 11.0), trade(1, Side::Buy, 10.0, 10.0)];
        let result = match_trades(&trades);
        assert_eq!(result.operations[0].side, PositionSide::Short);

        let swapped = vec![trade(1, Side::Buy, 10.0, 10.0), trade(1, Side::Sell, 10.0, 11.0)];
        let result = match_trades(&swapped);
        assert_eq!(result.operations[0].side, PositionSide::Long);
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_time() {
        let trades = vec![
            trade_at("ACC", "XPTO3", 2, 15, Side::Sell, 10.0, 12.0),
            trade_at("ACC", "XPTO3", 2, 9, Side::Buy, 10.0, 10.0),
        ];
        let result = match_trades(&trades);
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.operations[0].side, PositionSide::Long);
        assert_eq!(result.operations[0].result_value, 20.0);
    }

    #[test]
    fn test_groups_are_independent() {
        let trades = vec![
            trade_at("A", "XPTO3", 1, 0, Side::Buy, 10.0, 10.0),
            trade_at("B", "XPTO3", 2, 0, Side::Sell, 10.0, 12.0),
            trade_at("A", "OTHR3", 3, 0, Side::Sell, 5.0, 1.0),
        ];
        let result = match_trades(&trades);
        assert!(result.operations.is_empty());
        assert_eq!(result.open_positions.len(), 3);
        assert_eq!(result.open_positions[1].side, PositionSide::Short);
    }

    #[test]
    fn test_quantity_conservation() {
        let trades = vec![
            trade(1, Side::Buy, 70.0, 10.0),
            trade(2, Side::Sell, 30.0, 11.0),
            trade(3, Side::Sell, 90.0, 12.0),
            trade(4, Side::Buy, 25.0, 9.0),
            trade(5, Side::Buy, 40.0, 9.5),
            trade(6, Side::Sell, 5.0, 10.0),
        ];
        let result = match_trades(&trades);

        let bought: f64 = trades.iter().filter(|t| t.side == Side::Buy).map(|t| t.quantity).sum();
        let sold: f64 = trades.iter().filter(|t| t.side == Side::Sell).map(|t| t.quantity).sum();
        // Every operation consumes one buy and one sell quantity
        let matched: f64 = result.operations.iter().map(|op| op.quantity).sum();
        let open_long: f64 = result
            .open_positions
            .iter()
            .filter(|p| p.side == PositionSide::Long)
            .map(|p| p.quantity)
            .sum();
        let open_short: f64 = result
            .open_positions
            .iter()
            .filter(|p| p.side == PositionSide::Short)
            .map(|p| p.quantity)
            .sum();

        assert!((matched + open_long - bought).abs() < 1e-9);
        assert!((matched + open_short - sold).abs() < 1e-9);
    }

    #[test]
    fn test_operations_sorted_by_exit_date() {
        let trades = vec![
            trade_at("A", "LATE3", 1, 0, Side::Buy, 1.0, 1.0),
            trade_at("A", "LATE3", 9, 0, Side::Sell, 1.0, 2.0),
            trade_at("A", "EARL3", 2, 0, Side::Buy, 1.0, 1.0),
            trade_at("A", "EARL3", 3, 0, Side::Sell, 1.0, 2.0),
        ];
        let result = match_trades(&trades);
        let tickers: Vec<&str> = result.operations.iter().map(|op| op.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["EARL3", "LATE3"]);
    }

    #[test]
    fn test_same_day_exits_ordered_by_time() {
        let trades = vec![
            trade_at("A", "LATE3", 5, 9, Side::Buy, 1.0, 1.0),
            trade_at("A", "LATE3", 5, 16, Side::Sell, 1.0, 2.0),
            trade_at("A", "EARL3", 5, 9, Side::Buy, 1.0, 1.0),
            trade_at("A", "EARL3", 5, 11, Side::Sell, 1.0, 0.5),
        ];
        let result = match_trades(&trades);
        let tickers: Vec<&str> = result.operations.iter().map(|op| op.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["EARL3", "LATE3"]);
        assert!(result.operations.iter().all(|op| op.exit_date == result.operations[0].exit_date));
    }

    #[test]
    fn test_operation_ids_are_deterministic_and_unique() {
        let trades = vec![
            trade(1, Side::Buy, 100.0, 10.0),
            trade(2, Side::Buy, 100.0, 12.0),
            trade(3, Side::Sell, 150.0, 15.0),
        ];
        let first = match_trades(&trades);
        let second = match_trades(&trades);
        assert_eq!(first.operations, second.operations);
        assert_ne!(first.operations[0].id, first.operations[1].id);
    }
}
