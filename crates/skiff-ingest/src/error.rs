//! Error types for ingestion.

use thiserror::Error;

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while consuming the firehose.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (connect, read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The event sink failed to persist or look up a record
    #[error("Sink error: {0}")]
    Sink(String),

    /// The cursor store failed to load or persist the resume position
    #[error("Cursor error: {0}")]
    Cursor(String),
}
