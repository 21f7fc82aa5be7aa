//! Event ingestion for Skiff - a resumable consumer of the record firehose.
//!
//! One long-lived connection per process subscribes to the watched
//! collections and delivers events one at a time. The client is generic over
//! three capabilities so the identical state machine runs in both
//! deployments:
//!
//! - [`Transport`]: how frames arrive (WebSocket in production, scripted
//!   fakes in tests)
//! - [`RecordSink`]: where validated events land (the replica's optimistic
//!   local store, or the appview's canonical store)
//! - [`CursorStore`]: where the durable resume position lives
//!
//! # Guarantees
//!
//! - Replayed events upsert by key; they never duplicate rows
//! - A row with a pending local write is never overwritten by a remote
//!   value ("local pending wins"); the event still advances the cursor
//! - Malformed payloads are dropped with a warning, never fatal
//! - A cursor older than the retention window is discarded and the caller
//!   is told to backfill instead of resuming from a gap

pub mod client;
pub mod error;
pub mod sink;
pub mod wire;

pub use client::{
    online_channel, Backoff, ClientState, IngestClient, IngestConfig, IngestHandle, Resume,
};
pub use error::{Error, Result};
pub use sink::{CursorStore, FirehoseConn, RecordEvent, RecordSink, Transport};
pub use wire::{Commit, CommitOp, FirehoseFrame};
