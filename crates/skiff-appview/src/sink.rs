//! Firehose sink writing into the canonical store.
//!
//! The appview never writes optimistically, so `is_locally_pending` is
//! always false: whatever the firehose delivers is the truth. Every write
//! nudges the affected board's subscribers.

use crate::notify::BoardNotifier;
use crate::store::CanonicalStore;
use skiff_ingest::{RecordEvent, RecordSink};
use skiff_types::RecordUri;
use std::sync::Arc;
use tracing::trace;

/// Bridges the ingestion client to the canonical store and the broadcast
/// channels.
#[derive(Clone)]
pub struct AppviewSink {
    store: Arc<CanonicalStore>,
    notifier: BoardNotifier,
}

impl AppviewSink {
    pub fn new(store: Arc<CanonicalStore>, notifier: BoardNotifier) -> Self {
        Self { store, notifier }
    }
}

impl RecordSink for AppviewSink {
    fn is_locally_pending(&self, _uri: &RecordUri) -> skiff_ingest::Result<bool> {
        // The canonical store has no local writes to protect.
        Ok(false)
    }

    fn upsert(&self, event: RecordEvent) -> skiff_ingest::Result<Option<RecordUri>> {
        let board = self
            .store
            .put(event.uri.clone(), event.record)
            .map_err(|e| skiff_ingest::Error::Sink(e.to_string()))?;
        trace!(uri = %event.uri, %board, "canonical upsert");
        self.notifier.notify(&board);
        Ok(Some(board))
    }

    fn delete(&self, uri: &RecordUri) -> skiff_ingest::Result<Option<RecordUri>> {
        let board = self
            .store
            .delete(uri)
            .map_err(|e| skiff_ingest::Error::Sink(e.to_string()))?;
        if let Some(board) = &board {
            trace!(%uri, %board, "canonical delete");
            self.notifier.notify(board);
        }
        Ok(board)
    }
}
