//! Error types for reconciliation.

use crate::repo::RepoError;
use thiserror::Error;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during reconciliation.
#[derive(Debug, Error)]
pub enum Error {
    /// Local store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Remote repository failure
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
