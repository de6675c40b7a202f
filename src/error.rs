use crate::types::UploadStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Could not open spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Could not write workbook: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("Could not read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Export was cancelled")]
    ExportCancelled,

    #[error("Export timed out after {attempts} status checks")]
    ExportTimeout { attempts: u32 },

    #[error("Duplicate record rejected by the server: {0}")]
    DuplicateRecord(String),

    #[error("Cannot move upload from {from} to {to}")]
    InvalidTransition { from: UploadStatus, to: UploadStatus },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Body text of a rejected API call, if any.
    pub fn api_body(&self) -> Option<&str> {
        match self {
            Error::Api { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
