//! Raw spreadsheet rows and the executed trades filtered out of them.
//!
//! A [`RawRow`] is whatever the reader found in the file: column labels in
//! their original order and untyped cells. [`RecordFilter`] turns a row into a
//! [`TradeRecord`] or explains why it was dropped.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::columns::{normalize_key, AliasTable, Field};
use crate::config::ReconcileConfig;
use crate::fifo::QUANTITY_EPSILON;
use crate::parsing::{is_unknown_date, parse_date_cell, parse_number, parse_time_of_day, unknown_date};

// ============================================================================
// Raw rows
// ============================================================================

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    /// Text for a blank-aware cell; blank strings collapse to `Empty`
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) => false,
        }
    }

    /// Cell rendered as a trimmed string; integral numbers lose their `.0`
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Self::Number(n) => n.to_string(),
            Self::Empty => String::new(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

/// A labelled cell with its normalized lookup key
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub label: String,
    pub key: String,
    pub value: CellValue,
}

/// One spreadsheet row, columns kept in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: Vec<RawColumn>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, value: impl Into<CellValue>) {
        let label = label.into();
        let key = normalize_key(&label);
        self.columns.push(RawColumn {
            label,
            key,
            value: value.into(),
        });
    }

    pub fn with(mut self, label: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.push(label, value);
        self
    }

    pub fn columns(&self) -> &[RawColumn] {
        &self.columns
    }

    /// Cell under the exact label, as written in the file
    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.columns.iter().find(|c| c.label == label).map(|c| &c.value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// True when every cell is blank
    pub fn is_blank(&self) -> bool {
        self.columns.iter().all(|c| c.value.is_empty())
    }

    /// Build a row from a JSON object (`{"papel": "ABCD3", "qtd": 100}`)
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut row = Self::new();
        for (label, value) in object {
            let cell = match value {
                Value::Null => CellValue::Empty,
                Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
                Value::String(s) => CellValue::text(s.as_str()),
                other => CellValue::text(other.to_string()),
            };
            row.push(label.as_str(), cell);
        }
        row
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (label, value) in iter {
            row.push(label, value);
        }
        row
    }
}

// ============================================================================
// Trade records
// ============================================================================

/// Direction of an executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Decide the side from a raw buy/sell cell ("C", "V", "Venda", "Sell"...).
    ///
    /// Only values starting with `V`, or normalizing to `venda` / `sell`, are
    /// sales. Everything else, including garbled or empty cells, is a `Buy`.
    /// Callers that need stricter validation must check the raw value first.
    pub fn from_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with(['V', 'v']) {
            return Self::Sell;
        }
        match normalize_key(trimmed).as_str() {
            "venda" | "sell" => Self::Sell,
            _ => Self::Buy,
        }
    }
}

/// A normalized executed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub date: NaiveDate,
    /// Execution time; midnight of `date` when the source has none
    pub date_time: NaiveDateTime,
    pub account: String,
    pub client: String,
    pub ticker: String,
    pub side: Side,
    /// Always positive
    pub quantity: f64,
    pub avg_price: f64,
    /// Financial volume as reported by the source, 0 when absent
    pub volume: f64,
    pub status: String,
}

/// Why a row did not become a [`TradeRecord`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingTicker,
    /// The "ticker" is a column title, i.e. a repeated header line
    HeaderEcho(String),
    ZeroQuantity,
    Status(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTicker => write!(f, "no ticker"),
            Self::HeaderEcho(value) => write!(f, "header line echoed as data ({})", value),
            Self::ZeroQuantity => write!(f, "zero quantity"),
            Self::Status(status) => write!(f, "status '{}' is not an execution", status),
        }
    }
}

/// Statuses (normalized) that count as executed
pub const DEFAULT_ACCEPTED_STATUSES: &[&str] = &["executada", "executed", "", "undefined"];

/// Cell values that are really column titles
pub const DEFAULT_HEADER_LITERALS: &[&str] = &["papel", "ativo", "symbol", "ticker", "codigo"];

/// Converts raw rows into executed trades
#[derive(Debug, Clone)]
pub struct RecordFilter {
    aliases: AliasTable,
    header_literals: HashSet<String>,
    accepted_statuses: HashSet<String>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

impl RecordFilter {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        let aliases = config.alias_table();

        let header_literals = config
            .header_literals
            .iter()
            .map(|s| normalize_key(s))
            .chain(aliases.aliases(Field::Ticker).iter().cloned())
            .filter(|s| !s.is_empty())
            .collect();

        let accepted_statuses = config
            .accepted_statuses
            .iter()
            .map(|s| normalize_key(s))
            .collect();

        Self {
            aliases,
            header_literals,
            accepted_statuses,
        }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    fn text(&self, row: &RawRow, field: Field) -> String {
        self.aliases
            .find(row, field)
            .map(CellValue::as_text)
            .unwrap_or_default()
    }

    /// Normalize a row, or tell why it is not an executed trade
    pub fn to_trade_record(&self, row: &RawRow) -> Result<TradeRecord, RejectReason> {
        let ticker = self.text(row, Field::Ticker).to_uppercase();
        if ticker.is_empty() {
            return Err(RejectReason::MissingTicker);
        }
        if self.header_literals.contains(&normalize_key(&ticker)) {
            return Err(RejectReason::HeaderEcho(ticker));
        }

        let quantity = self
            .aliases
            .find(row, Field::Quantity)
            .map(parse_number)
            .unwrap_or(0.0)
            .abs();
        // At or below the matching tolerance counts as zero; also rejects NaN
        if !(quantity > QUANTITY_EPSILON) {
            return Err(RejectReason::ZeroQuantity);
        }

        let status = self.text(row, Field::Status);
        if !self.accepted_statuses.contains(&normalize_key(&status)) {
            return Err(RejectReason::Status(status));
        }

        let side = Side::from_cell(&self.text(row, Field::Side));
        let avg_price = self.aliases.find(row, Field::AvgPrice).map(parse_number).unwrap_or(0.0);
        let volume = self.aliases.find(row, Field::Volume).map(parse_number).unwrap_or(0.0);
        let (date, date_time) = self.resolve_dates(row);

        Ok(TradeRecord {
            date,
            date_time,
            account: self.text(row, Field::Account),
            client: self.text(row, Field::Client),
            ticker,
            side,
            quantity,
            avg_price,
            volume,
            status,
        })
    }

    /// Trade date and execution time.
    ///
    /// The timestamp column wins when it parses; a bare time of day is joined
    /// with the trade date; otherwise the trade date at midnight is used.
    fn resolve_dates(&self, row: &RawRow) -> (NaiveDate, NaiveDateTime) {
        let date_cell = self.aliases.find(row, Field::Date);
        let stamp_cell = self.aliases.find(row, Field::Timestamp);

        let date_value = date_cell.map(parse_date_cell).unwrap_or_else(unknown_date);
        let stamp_value = stamp_cell.map(parse_date_cell).unwrap_or_else(unknown_date);

        let date = if !is_unknown_date(&date_value) {
            date_value.date()
        } else if !is_unknown_date(&stamp_value) {
            stamp_value.date()
        } else {
            log::warn!("Trade row without a readable date, using epoch");
            unknown_date().date()
        };

        let date_time = if !is_unknown_date(&stamp_value) {
            stamp_value
        } else {
            let time_of_day = stamp_cell
                .and_then(|cell| match cell {
                    CellValue::Text(s) => parse_time_of_day(s),
                    _ => None,
                })
                .unwrap_or(NaiveTime::MIN);
            date.and_time(time_of_day)
        };

        (date, date_time)
    }
}
