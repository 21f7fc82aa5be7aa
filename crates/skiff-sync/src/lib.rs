//! Local-first reconciliation between a replica and remote repositories.
//!
//! Writes land in the local store immediately as `pending` rows, so the UI
//! never waits on the network. The [`SyncEngine`] then pushes them to the
//! author's own repository on an interval, and pulls full board state from
//! every known participant's repository on demand. Incoming remote content
//! never overwrites a local pending write, and byte-identical content is
//! skipped via a blake3 hash comparison.
//!
//! # Architecture
//!
//! ```text
//!   put_local            SyncEngine::run
//!      |                 /            \
//!      v          push_cycle        pull_board
//!  LocalStore  ---- pending ---->  RepoClient (per author)
//!      ^                                |
//!      +------- upsert_remote ----------+
//! ```
//!
//! [`MemoryStore`] is the reference store: it also implements the ingestion
//! sink and cursor traits, so one value can back the engine and the
//! firehose client at once.

pub mod engine;
pub mod error;
pub mod repo;
pub mod store;

pub use engine::{PullStats, PushStats, SyncConfig, SyncEngine, SyncHandle};
pub use error::{Error, Result};
pub use repo::{RecordPage, RepoClient, RepoError, RepoResult};
pub use store::{board_of, content_hash, LocalStore, MemoryStore, UpsertOutcome};
