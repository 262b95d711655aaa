//! Locale-aware number and date parsing for broker exports
//!
//! Broker spreadsheets mix Brazilian (`1.234,56`) and US (`1,234.56`) number
//! formats and day-first timestamps (`DD/MM/YYYY HH:MM`). Every parser in this
//! module is lenient:
//! - Unparseable numbers resolve to `0.0`
//! - Unparseable dates resolve to the Unix epoch, which sorts first
//!
//! Nothing here returns an error, so a single garbled cell never aborts an import.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::records::CellValue;

/// Everything that can't be part of a number: currency symbols, codes, spaces
static RE_NUMBER_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9,.\-]").unwrap());

/// Excel serial day 0 (the 1900 leap-year bug is already folded in)
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

// ============================================================================
// Numbers
// ============================================================================

/// Parse a spreadsheet cell into a number.
///
/// Numeric cells pass through unchanged, empty cells are `0.0`.
pub fn parse_number(cell: &CellValue) -> f64 {
    match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => parse_number_str(s),
        CellValue::Empty => 0.0,
    }
}

/// Parse a number written in either Brazilian or US notation.
///
/// When both `,` and `.` appear, whichever comes last is the decimal point and
/// the other one is a thousands separator. A lone `,` is a decimal comma.
pub fn parse_number_str(s: &str) -> f64 {
    let cleaned = RE_NUMBER_NOISE.replace_all(s.trim(), "");
    if cleaned.is_empty() {
        return 0.0;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // 1.234,56 -> 1234.56
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        // 1,234.56 -> 1234.56
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned.into_owned(),
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

// ============================================================================
// Dates
// ============================================================================

/// Sentinel for "date unknown": 1970-01-01 00:00
pub fn unknown_date() -> NaiveDateTime {
    NaiveDateTime::default()
}

pub fn is_unknown_date(value: &NaiveDateTime) -> bool {
    *value == unknown_date()
}

/// Parse `DD/MM/YYYY[ HH:MM[:SS]]` into a timestamp.
///
/// Two-digit years are read as 20YY and a missing time means midnight. ISO
/// dates (`YYYY-MM-DD`, optionally with a `T` or space separated time) are
/// accepted as well. Anything else yields [`unknown_date`].
pub fn parse_date(raw: &str) -> NaiveDateTime {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return unknown_date();
    }

    let (date_part, time_part) = match trimmed.split_once(' ') {
        Some((date, time)) => (date, time.trim()),
        None => match trimmed.split_once('T') {
            Some((date, time)) if date.contains('-') => (date, time),
            _ => (trimmed, ""),
        },
    };

    let Some(date) = parse_day_first(date_part).or_else(|| parse_iso(date_part)) else {
        return unknown_date();
    };

    let time = if time_part.is_empty() {
        NaiveTime::MIN
    } else {
        // A readable date with a garbled time still beats the epoch
        parse_time_of_day(time_part).unwrap_or(NaiveTime::MIN)
    };

    date.and_time(time)
}

/// Parse a cell that holds a date.
///
/// Numbers are read as Excel serial dates (days since 1899-12-30, the
/// fraction being the time of day).
pub fn parse_date_cell(cell: &CellValue) -> NaiveDateTime {
    match cell {
        CellValue::Text(s) => parse_date(s),
        CellValue::Number(n) => excel_serial_to_datetime(*n).unwrap_or_else(unknown_date),
        CellValue::Empty => unknown_date(),
    }
}

/// Parse a bare `HH:MM[:SS[.fff]]` time of day
pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn parse_day_first(s: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let year_str = parts[2].trim();
    let year: i32 = if year_str.len() == 2 {
        format!("20{}", year_str).parse().ok()?
    } else {
        year_str.parse().ok()?
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_iso(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // Anything outside 1900-01-01..9999-12-31 is not a serial date
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?.and_time(NaiveTime::MIN);
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}
