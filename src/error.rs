use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },

    #[error("row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("row {row}: cannot parse date `{value}`, expected dd.mm.yyyy")]
    InvalidDate { row: usize, value: String },

    #[error("unsupported spreadsheet format for {}; expected .xlsx or .csv", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("workbook has no `{0}` sheet")]
    MissingSheet(String),

    #[error("failed to read workbook: {0}")]
    Read(#[from] calamine::XlsxError),

    #[error("failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::EmptyField { .. })
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
