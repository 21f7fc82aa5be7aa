//! Error types for the appview.

use thiserror::Error;

/// Result type for appview operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the appview.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Firehose ingestion failure
    #[error("Ingestion error: {0}")]
    Ingest(#[from] skiff_ingest::Error),

    /// Malformed stored data
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}
