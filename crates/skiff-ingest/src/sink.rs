//! Capability traits the ingestion client is generic over.
//!
//! The browser-side replica and the server-side appview run the exact same
//! ingestion state machine; only the sink differs (optimistic local store
//! vs. canonical store). Factoring the sink as a trait keeps the
//! reconnect/cursor logic in one place.

use crate::error::Result;
use crate::wire::FirehoseFrame;
use skiff_types::{Collection, Record, RecordUri};
use std::sync::Arc;

/// A validated record arriving from the firehose.
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub uri: RecordUri,
    pub record: Record,
    /// Event time of the frame that carried the record
    pub time_us: u64,
}

/// Where validated events land: a per-user local store or the appview's
/// canonical store.
pub trait RecordSink {
    /// Whether the local row for this key is an unconfirmed local write.
    /// When true, incoming remote values for the key are discarded
    /// (local pending wins).
    fn is_locally_pending(&self, uri: &RecordUri) -> Result<bool>;

    /// Upsert by key; replaying the same event must not duplicate the row.
    /// Returns the affected board, if the record carries one, so callers
    /// can notify board subscribers.
    fn upsert(&self, event: RecordEvent) -> Result<Option<RecordUri>>;

    /// Remove the row for this key if present; absent rows are a no-op,
    /// never an error. Returns the affected board when a row was removed.
    fn delete(&self, uri: &RecordUri) -> Result<Option<RecordUri>>;
}

impl<S: RecordSink> RecordSink for Arc<S> {
    fn is_locally_pending(&self, uri: &RecordUri) -> Result<bool> {
        (**self).is_locally_pending(uri)
    }

    fn upsert(&self, event: RecordEvent) -> Result<Option<RecordUri>> {
        (**self).upsert(event)
    }

    fn delete(&self, uri: &RecordUri) -> Result<Option<RecordUri>> {
        (**self).delete(uri)
    }
}

/// Durable storage for the resume cursor: a single microsecond timestamp
/// under a well-known key.
pub trait CursorStore {
    fn load(&self) -> Result<Option<u64>>;
    fn save(&self, cursor: u64) -> Result<()>;
}

impl<C: CursorStore> CursorStore for Arc<C> {
    fn load(&self) -> Result<Option<u64>> {
        (**self).load()
    }

    fn save(&self, cursor: u64) -> Result<()> {
        (**self).save(cursor)
    }
}

/// An established firehose connection delivering frames one at a time.
pub trait FirehoseConn {
    /// The next frame, or `None` on clean close.
    fn next_frame(&mut self) -> impl std::future::Future<Output = Result<Option<FirehoseFrame>>>;
}

/// A way to (re)establish the firehose connection, parameterized by the
/// watched collections and an optional resume cursor.
pub trait Transport {
    type Conn: FirehoseConn;

    fn connect(
        &mut self,
        collections: &[Collection],
        cursor: Option<u64>,
    ) -> impl std::future::Future<Output = Result<Self::Conn>>;
}
