use thiserror::Error;

use crate::models::{FileId, FileStatus};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("No supported files selected (expected .csv, .xlsx or .xls)")]
    NoSupportedFiles,

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("File read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse task failed: {0}")]
    TaskFailed(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("No parsed files ready to import")]
    NothingToImport,

    #[error("An import is already in progress")]
    ImportInProgress,

    #[error("Import failed: {0}")]
    ImportFailed(String),

    #[error("Unknown file: {0}")]
    UnknownFile(FileId),

    #[error("Invalid status change for file {file_id}: {from} -> {to}")]
    InvalidTransition {
        file_id: FileId,
        from: FileStatus,
        to: FileStatus,
    },
}

impl From<calamine::XlsxError> for ImportError {
    fn from(err: calamine::XlsxError) -> Self {
        ImportError::Spreadsheet(err.to_string())
    }
}

impl From<calamine::XlsError> for ImportError {
    fn from(err: calamine::XlsError) -> Self {
        ImportError::Spreadsheet(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ImportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ImportError::TaskFailed(err.to_string())
    }
}
