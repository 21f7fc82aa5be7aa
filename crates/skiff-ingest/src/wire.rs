//! Firehose wire frames.
//!
//! The firehose delivers JSON frames, one per repository commit, filtered
//! to the watched collections. `create`/`update` commits carry the record
//! payload; `delete` commits carry only the identity of the removed record.

use serde::{Deserialize, Serialize};
use skiff_types::Did;

/// One firehose frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseFrame {
    /// The repository the commit came from
    pub did: Did,
    /// Event time in microseconds; the ingestion cursor unit
    pub time_us: u64,
    /// Frame kind; only `"commit"` frames carry record changes
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Commit>,
}

/// The commit body of a frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// Repository revision of the commit
    pub rev: String,
    pub operation: CommitOp,
    /// Collection NSID; frames for unwatched collections are skipped
    pub collection: String,
    pub rkey: String,
    /// Record payload; present for create/update, absent for delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
}

/// The operation a commit performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOp {
    Create,
    Update,
    Delete,
}
