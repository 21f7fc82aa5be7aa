//! Persistent canonical storage using RocksDB.
//!
//! One row per record, keyed by `{collection}:{did}/{rkey}` so a collection
//! prefix scan walks every record of that kind. The resume cursor for the
//! firehose lives under its own `meta:` key. Unlike a replica's local
//! store, nothing here is ever "pending": the firehose is the only writer
//! and its content is canonical by definition.

use crate::error::{Error, Result};
use rocksdb::{Options, DB};
use serde::{Deserialize, Serialize};
use skiff_types::{now_micros, Collection, Record, RecordUri};
use std::path::Path;

const CURSOR_KEY: &[u8] = b"meta:cursor";

/// A stored canonical record with its indexing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub uri: RecordUri,
    pub record: Record,
    /// Microsecond wall-clock time this row was last written
    pub indexed_at: u64,
}

/// The board a record belongs to; boards belong to themselves.
pub fn board_key(uri: &RecordUri, record: &Record) -> RecordUri {
    record.board_uri().cloned().unwrap_or_else(|| uri.clone())
}

fn row_key(uri: &RecordUri) -> String {
    format!("{}:{}/{}", uri.collection.as_str(), uri.did, uri.rkey)
}

/// Canonical store for the appview.
pub struct CanonicalStore {
    db: DB,
}

impl CanonicalStore {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Store a record, replacing any previous row for the key. Returns the
    /// board the record belongs to.
    pub fn put(&self, uri: RecordUri, record: Record) -> Result<RecordUri> {
        let board = board_key(&uri, &record);
        let row = CanonicalRow {
            uri,
            record,
            indexed_at: now_micros(),
        };
        let value = serde_json::to_vec(&row)?;
        self.db.put(row_key(&row.uri).as_bytes(), value)?;
        Ok(board)
    }

    /// Get a row by key.
    pub fn get(&self, uri: &RecordUri) -> Result<Option<CanonicalRow>> {
        match self.db.get(row_key(uri).as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Delete a row if present, returning the board it belonged to.
    pub fn delete(&self, uri: &RecordUri) -> Result<Option<RecordUri>> {
        let Some(row) = self.get(uri)? else {
            return Ok(None);
        };
        self.db.delete(row_key(uri).as_bytes())?;
        Ok(Some(board_key(&row.uri, &row.record)))
    }

    /// List all rows of one collection.
    pub fn list_collection(&self, collection: Collection) -> Result<Vec<CanonicalRow>> {
        let prefix = format!("{}:", collection.as_str());
        let mut rows = Vec::new();

        let iter = self.db.prefix_iterator(prefix.as_bytes());
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix.as_bytes()) {
                let row: CanonicalRow = serde_json::from_slice(&value)?;
                rows.push(row);
            } else {
                break;
            }
        }

        Ok(rows)
    }

    /// List every row belonging to one board, across all collections.
    pub fn list_board(&self, board: &RecordUri) -> Result<Vec<CanonicalRow>> {
        let mut rows = Vec::new();
        for collection in Collection::ALL {
            for row in self.list_collection(collection)? {
                if &board_key(&row.uri, &row.record) == board {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    pub fn load_cursor(&self) -> Result<Option<u64>> {
        match self.db.get(CURSOR_KEY)? {
            Some(data) => {
                let text = String::from_utf8(data.to_vec())
                    .map_err(|e| Error::Corrupt(e.to_string()))?;
                let cursor = text
                    .parse::<u64>()
                    .map_err(|e| Error::Corrupt(e.to_string()))?;
                Ok(Some(cursor))
            }
            None => Ok(None),
        }
    }

    pub fn save_cursor(&self, cursor: u64) -> Result<()> {
        self.db.put(CURSOR_KEY, cursor.to_string().as_bytes())?;
        Ok(())
    }
}

impl skiff_ingest::CursorStore for CanonicalStore {
    fn load(&self) -> skiff_ingest::Result<Option<u64>> {
        self.load_cursor()
            .map_err(|e| skiff_ingest::Error::Cursor(e.to_string()))
    }

    fn save(&self, cursor: u64) -> skiff_ingest::Result<()> {
        self.save_cursor(cursor)
            .map_err(|e| skiff_ingest::Error::Cursor(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_ingest::CursorStore;
    use skiff_types::{Did, Task};

    fn did(s: &str) -> Did {
        Did::new(format!("did:plc:{s}")).unwrap()
    }

    fn board_uri(rkey: &str) -> RecordUri {
        RecordUri::new(did("owner"), Collection::Board, rkey).unwrap()
    }

    fn task(board: &RecordUri, title: &str) -> Record {
        Record::Task(Task {
            title: title.to_string(),
            description: None,
            column_id: "todo".into(),
            board_uri: board.clone(),
            position: Some("a1".into()),
            order: None,
            label_ids: None,
            created_at: 1000,
            updated_at: None,
        })
    }

    fn open_store() -> (tempfile::TempDir, CanonicalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CanonicalStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let (_dir, store) = open_store();
        let board = board_uri("b1");
        let uri = RecordUri::new(did("alice"), Collection::Task, "t1").unwrap();

        let reported = store.put(uri.clone(), task(&board, "hello")).unwrap();
        assert_eq!(reported, board);

        let row = store.get(&uri).unwrap().unwrap();
        assert_eq!(row.uri, uri);

        let removed = store.delete(&uri).unwrap();
        assert_eq!(removed, Some(board));
        assert!(store.get(&uri).unwrap().is_none());
    }

    #[test]
    fn delete_absent_row_is_none() {
        let (_dir, store) = open_store();
        let uri = RecordUri::new(did("alice"), Collection::Task, "gone").unwrap();
        assert_eq!(store.delete(&uri).unwrap(), None);
    }

    #[test]
    fn put_replaces_existing_row() {
        let (_dir, store) = open_store();
        let board = board_uri("b1");
        let uri = RecordUri::new(did("alice"), Collection::Task, "t1").unwrap();

        store.put(uri.clone(), task(&board, "first")).unwrap();
        store.put(uri.clone(), task(&board, "second")).unwrap();

        let rows = store.list_collection(Collection::Task).unwrap();
        assert_eq!(rows.len(), 1);
        match &rows[0].record {
            Record::Task(t) => assert_eq!(t.title, "second"),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn list_board_filters_other_boards() {
        let (_dir, store) = open_store();
        let b1 = board_uri("b1");
        let b2 = board_uri("b2");

        store
            .put(
                RecordUri::new(did("alice"), Collection::Task, "t1").unwrap(),
                task(&b1, "on b1"),
            )
            .unwrap();
        store
            .put(
                RecordUri::new(did("alice"), Collection::Task, "t2").unwrap(),
                task(&b2, "on b2"),
            )
            .unwrap();

        let rows = store.list_board(&b1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uri.rkey, "t1");
    }

    #[test]
    fn board_record_belongs_to_itself() {
        let (_dir, store) = open_store();
        let b1 = board_uri("b1");
        let board_record = Record::Board(skiff_types::Board {
            name: "Roadmap".into(),
            description: None,
            columns: vec![skiff_types::Column {
                id: "todo".into(),
                name: "To do".into(),
                order: 0,
            }],
            labels: None,
            open: true,
            policy: None,
            created_at: 1000,
        });

        store.put(b1.clone(), board_record).unwrap();
        let rows = store.list_board(&b1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uri, b1);
    }

    #[test]
    fn cursor_roundtrip_through_trait() {
        let (_dir, store) = open_store();
        assert_eq!(store.load().unwrap(), None);
        store.save(123_456).unwrap();
        assert_eq!(store.load().unwrap(), Some(123_456));
    }
}
