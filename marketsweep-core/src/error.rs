use marketsweep_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Catalog store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Blob store error: {0}")]
    Blob(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ImportError {
    /// Errors that abort a whole run. Everything else is scoped to a single
    /// listing or category and is logged and skipped by the importer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Store(_) | ImportError::Serialization(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ImportError::Duplicate(_))
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
