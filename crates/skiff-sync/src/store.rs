//! The local optimistic store.
//!
//! Keyed, indexed storage with upsert-by-key semantics; the browser
//! deployment backs this with IndexedDB, tests and the reference replica use
//! the in-memory implementation. All remote-originated writes go through
//! [`LocalStore::upsert_remote`], which enforces the two reconciliation
//! rules: local pending wins, and byte-identical remote content is skipped
//! to avoid redundant writes and re-renders.

use crate::error::{Error, Result};
use skiff_ingest::{RecordEvent, RecordSink};
use skiff_types::{Did, Record, RecordUri, Stored, SyncStatus};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Content hash of a record's canonical JSON encoding, used to detect
/// remote reads that changed nothing.
pub fn content_hash(record: &Record) -> Result<blake3::Hash> {
    let bytes = serde_json::to_vec(record)?;
    Ok(blake3::hash(&bytes))
}

/// The board a stored record belongs to. A board record's board is its own
/// address.
pub fn board_of(uri: &RecordUri, record: &Record) -> RecordUri {
    record.board_uri().cloned().unwrap_or_else(|| uri.clone())
}

/// Outcome of a remote-originated upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New row created
    Inserted,
    /// Existing row replaced with changed content
    Updated,
    /// Remote content is byte-identical to the stored row; nothing written
    Unchanged,
    /// The row has an unconfirmed local write; the remote value was discarded
    SkippedPending,
}

/// Keyed record storage for one replica.
pub trait LocalStore {
    fn get(&self, uri: &RecordUri) -> Result<Option<Stored<Record>>>;

    /// Store a locally authored record as `pending`.
    fn put_local(&self, uri: RecordUri, record: Record) -> Result<()>;

    /// Apply a remote-originated value, observing local-pending-wins and
    /// skipping byte-identical content.
    fn upsert_remote(&self, uri: RecordUri, record: Record) -> Result<UpsertOutcome>;

    fn set_status(&self, uri: &RecordUri, status: SyncStatus) -> Result<()>;

    /// Remove a row if present; absent rows are a no-op.
    fn remove(&self, uri: &RecordUri) -> Result<()>;

    /// All of `author`'s records awaiting a remote write.
    fn list_pending(&self, author: &Did) -> Result<Vec<Stored<Record>>>;

    /// Give records stuck in `error` another chance before a push cycle.
    fn reset_errors(&self, author: &Did) -> Result<()>;

    /// All records on a board, across collections.
    fn list_board(&self, board: &RecordUri) -> Result<Vec<Stored<Record>>>;

    /// Identities known to have contributed to a board.
    fn participants(&self, board: &RecordUri) -> Result<Vec<Did>>;

    fn note_participant(&self, did: &Did, board: &RecordUri) -> Result<()>;
}

impl<S: LocalStore> LocalStore for Arc<S> {
    fn get(&self, uri: &RecordUri) -> Result<Option<Stored<Record>>> {
        (**self).get(uri)
    }

    fn put_local(&self, uri: RecordUri, record: Record) -> Result<()> {
        (**self).put_local(uri, record)
    }

    fn upsert_remote(&self, uri: RecordUri, record: Record) -> Result<UpsertOutcome> {
        (**self).upsert_remote(uri, record)
    }

    fn set_status(&self, uri: &RecordUri, status: SyncStatus) -> Result<()> {
        (**self).set_status(uri, status)
    }

    fn remove(&self, uri: &RecordUri) -> Result<()> {
        (**self).remove(uri)
    }

    fn list_pending(&self, author: &Did) -> Result<Vec<Stored<Record>>> {
        (**self).list_pending(author)
    }

    fn reset_errors(&self, author: &Did) -> Result<()> {
        (**self).reset_errors(author)
    }

    fn list_board(&self, board: &RecordUri) -> Result<Vec<Stored<Record>>> {
        (**self).list_board(board)
    }

    fn participants(&self, board: &RecordUri) -> Result<Vec<Did>> {
        (**self).participants(board)
    }

    fn note_participant(&self, did: &Did, board: &RecordUri) -> Result<()> {
        (**self).note_participant(did, board)
    }
}

/// In-memory [`LocalStore`]. Rows are ordered by URI so listings are
/// deterministic. Also implements the ingestion [`RecordSink`], making it
/// the replica-side landing zone for firehose events.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<RecordUri, Stored<Record>>>,
    participants: Mutex<HashSet<(Did, RecordUri)>>,
    cursor: Mutex<Option<u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<RecordUri, Stored<Record>>> {
        self.rows.read().expect("store lock poisoned")
    }

    fn rows_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<RecordUri, Stored<Record>>> {
        self.rows.write().expect("store lock poisoned")
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, uri: &RecordUri) -> Result<Option<Stored<Record>>> {
        Ok(self.rows().get(uri).cloned())
    }

    fn put_local(&self, uri: RecordUri, record: Record) -> Result<()> {
        let row = Stored::new(uri.clone(), record, SyncStatus::Pending);
        self.rows_mut().insert(uri, row);
        Ok(())
    }

    fn upsert_remote(&self, uri: RecordUri, record: Record) -> Result<UpsertOutcome> {
        let mut rows = self.rows_mut();
        match rows.get(&uri) {
            Some(existing) if existing.status == SyncStatus::Pending => {
                Ok(UpsertOutcome::SkippedPending)
            }
            Some(existing) => {
                if content_hash(&existing.value)? == content_hash(&record)? {
                    return Ok(UpsertOutcome::Unchanged);
                }
                rows.insert(uri.clone(), Stored::new(uri, record, SyncStatus::Synced));
                Ok(UpsertOutcome::Updated)
            }
            None => {
                rows.insert(uri.clone(), Stored::new(uri, record, SyncStatus::Synced));
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn set_status(&self, uri: &RecordUri, status: SyncStatus) -> Result<()> {
        let mut rows = self.rows_mut();
        match rows.get_mut(uri) {
            Some(row) => {
                row.status = status;
                Ok(())
            }
            None => Err(Error::Store(format!("no row for {uri}"))),
        }
    }

    fn remove(&self, uri: &RecordUri) -> Result<()> {
        self.rows_mut().remove(uri);
        Ok(())
    }

    fn list_pending(&self, author: &Did) -> Result<Vec<Stored<Record>>> {
        Ok(self
            .rows()
            .values()
            .filter(|row| row.status == SyncStatus::Pending && row.author() == author)
            .cloned()
            .collect())
    }

    fn reset_errors(&self, author: &Did) -> Result<()> {
        for row in self.rows_mut().values_mut() {
            if row.status == SyncStatus::Error && &row.uri.did == author {
                row.status = SyncStatus::Pending;
            }
        }
        Ok(())
    }

    fn list_board(&self, board: &RecordUri) -> Result<Vec<Stored<Record>>> {
        Ok(self
            .rows()
            .values()
            .filter(|row| &board_of(&row.uri, &row.value) == board)
            .cloned()
            .collect())
    }

    fn participants(&self, board: &RecordUri) -> Result<Vec<Did>> {
        let mut dids: Vec<Did> = self
            .participants
            .lock()
            .expect("participants lock poisoned")
            .iter()
            .filter(|(_, b)| b == board)
            .map(|(did, _)| did.clone())
            .collect();
        dids.sort();
        Ok(dids)
    }

    fn note_participant(&self, did: &Did, board: &RecordUri) -> Result<()> {
        self.participants
            .lock()
            .expect("participants lock poisoned")
            .insert((did.clone(), board.clone()));
        Ok(())
    }
}

impl RecordSink for MemoryStore {
    fn is_locally_pending(&self, uri: &RecordUri) -> skiff_ingest::Result<bool> {
        Ok(self
            .rows()
            .get(uri)
            .map_or(false, |row| row.status == SyncStatus::Pending))
    }

    fn upsert(&self, event: RecordEvent) -> skiff_ingest::Result<Option<RecordUri>> {
        let board = board_of(&event.uri, &event.record);
        self.note_participant(&event.uri.did, &board)
            .map_err(|e| skiff_ingest::Error::Sink(e.to_string()))?;
        self.upsert_remote(event.uri, event.record)
            .map_err(|e| skiff_ingest::Error::Sink(e.to_string()))?;
        Ok(Some(board))
    }

    fn delete(&self, uri: &RecordUri) -> skiff_ingest::Result<Option<RecordUri>> {
        let mut rows = self.rows_mut();
        match rows.get(uri) {
            // Local pending wins over a remote delete racing it.
            Some(row) if row.status == SyncStatus::Pending => Ok(None),
            Some(row) => {
                let board = board_of(&row.uri, &row.value);
                rows.remove(uri);
                Ok(Some(board))
            }
            None => Ok(None),
        }
    }
}

impl skiff_ingest::CursorStore for MemoryStore {
    fn load(&self) -> skiff_ingest::Result<Option<u64>> {
        Ok(*self.cursor.lock().expect("cursor lock poisoned"))
    }

    fn save(&self, cursor: u64) -> skiff_ingest::Result<()> {
        *self.cursor.lock().expect("cursor lock poisoned") = Some(cursor);
        Ok(())
    }
}
