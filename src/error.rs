use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ledger {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("ledger has no valid header, refusing to modify it")]
    InvalidHeader,
    #[error("no ledger entry at position {0}")]
    NoSuchEntry(usize),
}

/// Failures detected before any request leaves the machine.
///
/// Network and API failures are not errors here; they come back as
/// [`crate::upload::UploadOutcome::Failed`] so the row can still be logged.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("API key is missing, set it in settings first")]
    MissingApiKey,
    #[error("file not found for upload: {0}")]
    MissingFile(PathBuf),
    #[error("could not build HTTP client: {0}")]
    Client(String),
}
