use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use std::path::Path;

use crate::columns::{normalize_key, AliasTable};
use crate::error::{Error, Result};
use crate::records::{CellValue, RawRow};

/// Rows searched for the header line; broker reports often start with a title block
const HEADER_SCAN_ROWS: usize = 20;

/// Known headers a row needs before it is taken as the header line
const MIN_HEADER_HITS: usize = 2;

/// Read one worksheet of an Excel/ODS workbook
pub fn read_workbook(path: &Path, sheet: Option<&str>, aliases: &AliasTable) -> Result<Vec<RawRow>> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet_names = workbook.sheet_names();
    let sheet_name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|s| s.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| Error::MissingSheet(name.to_string()))?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| Error::MissingSheet("(workbook has no sheets)".to_string()))?,
    };

    log::debug!("Reading sheet '{}' of {}", sheet_name, path.display());
    let range = workbook.worksheet_range(&sheet_name)?;
    rows_from_range(&range, aliases)
}

/// Convert a worksheet range into rows keyed by the detected header line
fn rows_from_range(range: &Range<Data>, aliases: &AliasTable) -> Result<Vec<RawRow>> {
    let grid: Vec<&[Data]> = range.rows().collect();
    let header_index = find_header_row(&grid, aliases).ok_or(Error::MissingHeader)?;

    let headers: Vec<String> = grid[header_index].iter().map(|c| cell_value(c).as_text()).collect();

    let mut rows = Vec::new();
    for cells in &grid[header_index + 1..] {
        let row: RawRow = headers
            .iter()
            .enumerate()
            .filter(|(_, label)| !label.is_empty())
            .map(|(index, label)| {
                let value = cells.get(index).map(cell_value).unwrap_or(CellValue::Empty);
                (label.as_str(), value)
            })
            .collect();

        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(rows)
}

/// First row among the leading ones with enough known headers,
/// otherwise the first non-empty row
fn find_header_row(grid: &[&[Data]], aliases: &AliasTable) -> Option<usize> {
    let known = grid.iter().take(HEADER_SCAN_ROWS).position(|cells| {
        let hits = cells
            .iter()
            .filter(|c| matches!(c, Data::String(_)))
            .filter(|c| aliases.is_known_header(&normalize_key(&cell_value(c).as_text())))
            .count();
        hits >= MIN_HEADER_HITS
    });

    if known.is_none() {
        log::warn!("No header line recognized, using the first non-empty row");
    }

    known.or_else(|| {
        grid.iter()
            .position(|cells| cells.iter().any(|c| !matches!(c, Data::Empty)))
    })
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::String(s) => CellValue::text(s.as_str()),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) => CellValue::text(dt.format("%d/%m/%Y %H:%M:%S").to_string()),
            None => CellValue::Empty,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s.as_str()),
        Data::Bool(b) => CellValue::text(b.to_string()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}
