use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the I/O layer around the matcher.
///
/// Parsing and matching themselves never fail; bad cells fall back to
/// defaults. Only reading files and loading configuration can go wrong.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet read failed: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported statement format: {0}")]
    UnsupportedFormat(String),

    #[error("Sheet not found: {0}")]
    MissingSheet(String),

    #[error("Statement has no header line")]
    MissingHeader,
}
