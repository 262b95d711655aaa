//! Statement readers
//!
//! Turns broker exports into [`RawRow`]s for the matcher:
//! - Delimited text (`.csv`, `.txt`): delimiter and encoding detected
//! - Spreadsheets (`.xlsx`, `.xlsm`, `.xls`, `.ods`): header row detected
//! - JSON (`.json`): an array of objects, one per row

mod delimited;
mod workbook;

pub use delimited::{detect_delimiter, parse_delimited};
pub use workbook::read_workbook;

use serde_json::Value;
use std::path::Path;

use crate::columns::AliasTable;
use crate::config::ReconcileConfig;
use crate::error::{Error, Result};
use crate::records::RawRow;

/// Supported statement file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementFormat {
    Delimited,
    Workbook,
    Json,
}

impl StatementFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" | "txt" => Ok(Self::Delimited),
            "xlsx" | "xlsm" | "xls" | "ods" => Ok(Self::Workbook),
            "json" => Ok(Self::Json),
            _ => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// How to read a statement
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Worksheet to read; the first one when unset
    pub sheet: Option<String>,
    /// Used to recognize the header row in spreadsheets
    pub aliases: AliasTable,
}

impl ReadOptions {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            sheet: None,
            aliases: config.alias_table(),
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }
}

/// Read a statement file, picking the reader from the file extension
pub fn read_statement(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Vec<RawRow>> {
    let path = path.as_ref();
    let rows = match StatementFormat::from_path(path)? {
        StatementFormat::Delimited => parse_delimited(&std::fs::read(path)?)?,
        StatementFormat::Workbook => read_workbook(path, options.sheet.as_deref(), &options.aliases)?,
        StatementFormat::Json => parse_json_rows(&std::fs::read_to_string(path)?)?,
    };

    log::info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Parse a JSON array of row objects; non-object entries are skipped
pub fn parse_json_rows(content: &str) -> Result<Vec<RawRow>> {
    let value: Value = serde_json::from_str(content)?;
    let Value::Array(items) = value else {
        return Err(Error::UnsupportedFormat("JSON statement must be an array of objects".to_string()));
    };

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item.as_object() {
            Some(object) => rows.push(RawRow::from_json_object(object)),
            None => log::warn!("JSON row {} is not an object, skipped", index + 1),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CellValue;
    use crate::reconcile::normalize_and_match;
    use std::io::Write;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(StatementFormat::from_path(Path::new("a.CSV")).unwrap(), StatementFormat::Delimited);
        assert_eq!(StatementFormat::from_path(Path::new("a.xlsx")).unwrap(), StatementFormat::Workbook);
        assert_eq!(StatementFormat::from_path(Path::new("a.json")).unwrap(), StatementFormat::Json);
        assert!(matches!(
            StatementFormat::from_path(Path::new("a.pdf")),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(StatementFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_parse_json_rows() {
        let rows = parse_json_rows(r#"[{"papel": "ABCD3", "qtd": 10}, 5, {"papel": "WXYZ4"}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("qtd"), Some(&CellValue::Number(10.0)));
        assert!(parse_json_rows(r#"{"papel": "ABCD3"}"#).is_err());
        assert!(parse_json_rows("not json").is_err());
    }

    #[test]
    fn test_read_csv_statement_end_to_end() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Data;Papel;C/V;Qtd Exec;Prc Médio;Status").unwrap();
        writeln!(file, "01/01/2024;ABCD3;C;100;10,00;Executada").unwrap();
        writeln!(file, "03/01/2024;ABCD3;C;50;11,00;Cancelada").unwrap();
        writeln!(file, "05/01/2024;ABCD3;V;100;12,50;Executada").unwrap();
        file.flush().unwrap();

        let rows = read_statement(file.path(), &ReadOptions::default()).unwrap();
        assert_eq!(rows.len(), 3);

        let outcome = normalize_and_match(&rows);
        assert_eq!(outcome.operations.len(), 1);
        assert_eq!(outcome.operations[0].result_value, 250.0);
        assert_eq!(outcome.stats.not_executed, 1);
    }

    #[test]
    fn test_read_json_statement() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[
                {{"data": "01/01/2024", "papel": "ABCD3", "cv": "C", "qtd_exec": "100", "prc_medio": "10,00", "status": "Executada"}},
                {{"data": "05/01/2024", "papel": "ABCD3", "cv": "V", "qtd_exec": 100, "prc_medio": 12.5, "status": "Executada"}}
            ]"#
        )
        .unwrap();
        file.flush().unwrap();

        let rows = read_statement(file.path(), &ReadOptions::default()).unwrap();
        let outcome = normalize_and_match(&rows);
        assert_eq!(outcome.operations.len(), 1);
        assert_eq!(outcome.operations[0].exit_price, 12.5);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = read_statement("/nonexistent/statement.csv", &ReadOptions::default());
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
