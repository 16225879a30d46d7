use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No transactions found in {0}")]
    NoTransactionsFound(String),

    #[error("None of the selected files yielded any transaction")]
    NothingToImport,

    #[error("No rows found for execution {0}")]
    ExecutionNotFound(u32),

    #[error("Invalid manual entry: {0}")]
    InvalidEntry(String),

    #[error("Unsupported source file {0:?} (expected .ofx or .pdf)")]
    UnsupportedSource(PathBuf),

    #[error("Could not read OFX document: {0}")]
    OfxParse(String),

    #[error("Could not extract PDF content from {path:?}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("Sales report {path:?}: {message}")]
    SalesFormat { path: PathBuf, message: String },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
