//! Remote repository access.
//!
//! Each author's records live in their own repository, reached through the
//! `listRecords`/`putRecord`/`deleteRecord`/`getRecord` surface. The trait
//! keeps the engine testable and lets deployments plug in their transport.
//!
//! Failures are classified on the error itself: transient failures leave
//! records `pending` for the next cycle, permanent rejections mark them
//! `error`.

use skiff_types::{Collection, Did, Record, RecordUri};
use std::future::Future;
use thiserror::Error;

/// Result type for remote repository calls.
pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// A remote repository call failure.
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    /// Connection-level failure; the record stays pending and is retried
    #[error("transient failure: {0}")]
    Transient(String),

    /// The server refused a well-formed call; the record is marked `error`
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// The call exceeded the request timeout
    #[error("request timed out")]
    Timeout,
}

impl RepoError {
    /// Whether a retry on the next cycle could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepoError::Transient(_) | RepoError::Timeout)
    }
}

/// One page of a repository listing.
#[derive(Debug, Clone)]
pub struct RecordPage {
    /// Raw records with their addresses; payloads are unvalidated
    pub records: Vec<(RecordUri, serde_json::Value)>,
    /// Opaque continuation token; `None` on the last page
    pub cursor: Option<String>,
}

/// Client for per-author remote repositories.
pub trait RepoClient {
    /// List records of one collection in one repository, paginated.
    fn list_records(
        &self,
        repo: &Did,
        collection: Collection,
        cursor: Option<String>,
    ) -> impl Future<Output = RepoResult<RecordPage>>;

    /// Idempotent upsert by record key.
    fn put_record(
        &self,
        repo: &Did,
        collection: Collection,
        rkey: &str,
        record: &Record,
    ) -> impl Future<Output = RepoResult<()>>;

    /// Delete by record key. Deleting an absent record is not an error.
    fn delete_record(
        &self,
        repo: &Did,
        collection: Collection,
        rkey: &str,
    ) -> impl Future<Output = RepoResult<()>>;

    /// Fetch a single raw record, if present.
    fn get_record(
        &self,
        repo: &Did,
        collection: Collection,
        rkey: &str,
    ) -> impl Future<Output = RepoResult<Option<serde_json::Value>>>;
}
