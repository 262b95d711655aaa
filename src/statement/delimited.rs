use csv::{ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::records::{CellValue, RawRow};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Pick the delimiter occurring most often in the header line.
///
/// Ties go to `;`, the usual separator of Brazilian and German exports.
pub fn detect_delimiter(line: &str) -> u8 {
    let semicolons = line.matches(';').count();
    let commas = line.matches(',').count();
    let tabs = line.matches('\t').count();

    if semicolons >= commas && semicolons >= tabs {
        b';'
    } else if tabs >= commas {
        b'\t'
    } else {
        b','
    }
}

/// UTF-8 when valid (BOM stripped), Windows-1252 otherwise
fn decode(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            log::debug!("Statement is not valid UTF-8, decoding as Windows-1252");
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Parse delimited text; the first record is the header line
pub fn parse_delimited(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let text = decode(bytes);
    let Some(header_line) = text.lines().find(|l| !l.trim().is_empty()) else {
        return Err(Error::MissingHeader);
    };
    let delimiter = detect_delimiter(header_line);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(Error::MissingHeader);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .filter(|(_, label)| !label.is_empty())
            .map(|(index, label)| (label, CellValue::text(record.get(index).unwrap_or(""))))
            .collect();

        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(rows)
}
