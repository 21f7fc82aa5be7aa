//! Error types for the Skiff data model.

use thiserror::Error;

/// Result type for data-model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing identities, URIs, or records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed DID
    #[error("Invalid DID: {0}")]
    InvalidDid(String),

    /// Malformed record URI
    #[error("Invalid record URI: {0}")]
    InvalidUri(String),

    /// Unknown record collection
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Malformed record key
    #[error("Invalid record key: {0}")]
    InvalidRecordKey(String),
}
