//! Record types and the schema gate.
//!
//! Every record is authored into its author's repository and replicated via
//! the firehose; `Record::validate` is the single entry point that turns an
//! untrusted raw payload into a typed record, or rejects it.

use crate::identity::{Collection, Did, RecordUri};
use crate::policy::BoardPolicy;
use crate::position;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Microseconds are the engine's time unit throughout: record timestamps,
/// op fold ordering, and the firehose cursor all use them.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Local sync lifecycle of a mutable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Locally authored, not yet confirmed written to the remote repository
    Pending,
    /// Confirmed present in the author's remote repository
    Synced,
    /// A non-transient remote write failure; retried on the next full cycle
    Error,
}

/// A column on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    pub order: u32,
}

/// A label a board offers for its tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// A board definition. The authoring identity is the board owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
    /// Open boards accept proposals from anyone; closed boards accept
    /// writes only from the owner and trusted identities.
    pub open: bool,
    /// Rich per-operation rules. When absent the `open` flag governs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<BoardPolicy>,
    pub created_at: u64,
}

/// A task on a board. Owned by its author, not necessarily the board owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub column_id: String,
    pub board_uri: RecordUri,
    /// Fractional position key; sorts bytewise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    /// Deprecated integer ordering, kept for records written by old clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
}

/// The sparse field map of an op: only the fields being changed are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
}

impl OpFields {
    /// True when the op changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.column_id.is_none()
            && self.position.is_none()
            && self.order.is_none()
            && self.label_ids.is_none()
    }
}

/// An append-only, author-attributed partial update to a task.
///
/// Ops are never mutated; a task's current state is always derived by
/// folding its op log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    /// The task this op edits
    pub target: RecordUri,
    pub board_uri: RecordUri,
    pub fields: OpFields,
    pub created_at: u64,
}

/// A board-scoped trust grant. The record author is the granter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustGrant {
    /// The identity being granted elevated write privileges
    pub trusted: Did,
    pub board_uri: RecordUri,
    pub created_at: u64,
}

/// An approval marking a specific untrusted record as visible on an open
/// board. The record author is the approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// The task or comment being accepted
    pub target: RecordUri,
    pub board_uri: RecordUri,
    pub created_at: u64,
}

/// A comment on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub target: RecordUri,
    pub board_uri: RecordUri,
    pub text: String,
    pub created_at: u64,
}

/// A reaction to a task or comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub target: RecordUri,
    pub board_uri: RecordUri,
    pub emoji: String,
    pub created_at: u64,
}

/// Local bookkeeping: an identity known to have contributed to a board,
/// whose repository therefore must be polled during full reconciliation.
/// Not a replicated record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownParticipant {
    pub did: Did,
    pub board_uri: RecordUri,
}

/// Any validated record the engine knows how to store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type", rename_all = "snake_case")]
pub enum Record {
    Board(Board),
    Task(Task),
    Op(Op),
    Trust(TrustGrant),
    Approval(Approval),
    Comment(Comment),
    Reaction(Reaction),
}

impl Record {
    /// The collection this record belongs to.
    pub fn collection(&self) -> Collection {
        match self {
            Record::Board(_) => Collection::Board,
            Record::Task(_) => Collection::Task,
            Record::Op(_) => Collection::Op,
            Record::Trust(_) => Collection::Trust,
            Record::Approval(_) => Collection::Approval,
            Record::Comment(_) => Collection::Comment,
            Record::Reaction(_) => Collection::Reaction,
        }
    }

    /// The board this record belongs to. `None` for board records, whose
    /// board is their own URI (which the record itself does not know).
    pub fn board_uri(&self) -> Option<&RecordUri> {
        match self {
            Record::Board(_) => None,
            Record::Task(t) => Some(&t.board_uri),
            Record::Op(o) => Some(&o.board_uri),
            Record::Trust(t) => Some(&t.board_uri),
            Record::Approval(a) => Some(&a.board_uri),
            Record::Comment(c) => Some(&c.board_uri),
            Record::Reaction(r) => Some(&r.board_uri),
        }
    }

    /// Validate and normalize a raw payload from the network into a typed
    /// record. Returns `None` when the payload does not conform to the
    /// collection's schema; callers drop such events and continue.
    pub fn validate(collection: Collection, raw: &serde_json::Value) -> Option<Record> {
        let record = match collection {
            Collection::Board => {
                let board: Board = serde_json::from_value(raw.clone()).ok()?;
                if board.name.trim().is_empty() || board.columns.is_empty() {
                    return None;
                }
                Record::Board(board)
            }
            Collection::Task => {
                let mut task: Task = serde_json::from_value(raw.clone()).ok()?;
                if task.title.trim().is_empty() || task.column_id.is_empty() {
                    return None;
                }
                if task.board_uri.collection != Collection::Board {
                    return None;
                }
                // Malformed or trailing-zero position keys would break
                // midpoint insertion; normalize them here, falling back to
                // the legacy order if nothing survives.
                task.position = task.position.as_deref().and_then(position::normalize);
                Record::Task(task)
            }
            Collection::Op => {
                let mut op: Op = serde_json::from_value(raw.clone()).ok()?;
                if op.target.collection != Collection::Task {
                    return None;
                }
                op.fields.position = op.fields.position.as_deref().and_then(position::normalize);
                if op.fields.is_empty() {
                    return None;
                }
                Record::Op(op)
            }
            Collection::Trust => Record::Trust(serde_json::from_value(raw.clone()).ok()?),
            Collection::Approval => Record::Approval(serde_json::from_value(raw.clone()).ok()?),
            Collection::Comment => {
                let comment: Comment = serde_json::from_value(raw.clone()).ok()?;
                if comment.text.is_empty() {
                    return None;
                }
                Record::Comment(comment)
            }
            Collection::Reaction => Record::Reaction(serde_json::from_value(raw.clone()).ok()?),
        };
        Some(record)
    }
}

/// A record row as held in a local or canonical table: the record plus its
/// address and sync lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub uri: RecordUri,
    pub value: T,
    pub status: SyncStatus,
}

impl<T> Stored<T> {
    /// Wrap a record with its address and status.
    pub fn new(uri: RecordUri, value: T, status: SyncStatus) -> Self {
        Self { uri, value, status }
    }

    /// The authoring identity, taken from the record's address.
    pub fn author(&self) -> &Did {
        &self.uri.did
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_uri() -> RecordUri {
        "at://did:plc:owner/app.skiff.board/b1".parse().unwrap()
    }

    fn task_uri() -> RecordUri {
        "at://did:plc:alice/app.skiff.task/t1".parse().unwrap()
    }

    #[test]
    fn validate_accepts_well_formed_task() {
        let raw = serde_json::json!({
            "title": "Ship the release",
            "column_id": "doing",
            "board_uri": board_uri().to_string(),
            "position": "a1",
            "created_at": 1000,
        });
        let record = Record::validate(Collection::Task, &raw).unwrap();
        match record {
            Record::Task(t) => {
                assert_eq!(t.title, "Ship the release");
                assert_eq!(t.position.as_deref(), Some("a1"));
            }
            other => panic!("expected task, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_empty_title() {
        let raw = serde_json::json!({
            "title": "   ",
            "column_id": "doing",
            "board_uri": board_uri().to_string(),
            "created_at": 1000,
        });
        assert!(Record::validate(Collection::Task, &raw).is_none());
    }

    #[test]
    fn validate_normalizes_trailing_zero_positions() {
        let raw = serde_json::json!({
            "title": "Ship the release",
            "column_id": "doing",
            "board_uri": board_uri().to_string(),
            "position": "a0",
            "created_at": 1000,
        });
        let record = Record::validate(Collection::Task, &raw).unwrap();
        match record {
            Record::Task(t) => assert_eq!(t.position.as_deref(), Some("a")),
            other => panic!("expected task, got {other:?}"),
        }

        // An all-minimum-digit key carries no usable position at all.
        let raw = serde_json::json!({
            "title": "Ship the release",
            "column_id": "doing",
            "board_uri": board_uri().to_string(),
            "position": "0",
            "order": 3,
            "created_at": 1000,
        });
        let record = Record::validate(Collection::Task, &raw).unwrap();
        match record {
            Record::Task(t) => {
                assert_eq!(t.position, None);
                assert_eq!(t.order, Some(3));
            }
            other => panic!("expected task, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_op_left_empty_by_position_normalization() {
        let raw = serde_json::json!({
            "target": task_uri().to_string(),
            "board_uri": board_uri().to_string(),
            "fields": {"position": "00"},
            "created_at": 1000,
        });
        assert!(Record::validate(Collection::Op, &raw).is_none());
    }

    #[test]
    fn validate_rejects_op_with_no_fields() {
        let raw = serde_json::json!({
            "target": task_uri().to_string(),
            "board_uri": board_uri().to_string(),
            "fields": {},
            "created_at": 1000,
        });
        assert!(Record::validate(Collection::Op, &raw).is_none());
    }

    #[test]
    fn validate_rejects_wrong_shape() {
        let raw = serde_json::json!({"completely": "unrelated"});
        for collection in Collection::ALL {
            assert!(
                Record::validate(collection, &raw).is_none(),
                "{collection} accepted garbage"
            );
        }
    }

    #[test]
    fn validate_rejects_op_targeting_non_task() {
        let raw = serde_json::json!({
            "target": board_uri().to_string(),
            "board_uri": board_uri().to_string(),
            "fields": {"title": "x"},
            "created_at": 1000,
        });
        assert!(Record::validate(Collection::Op, &raw).is_none());
    }

    #[test]
    fn record_reports_its_board() {
        let raw = serde_json::json!({
            "target": task_uri().to_string(),
            "board_uri": board_uri().to_string(),
            "fields": {"title": "New title"},
            "created_at": 1000,
        });
        let record = Record::validate(Collection::Op, &raw).unwrap();
        assert_eq!(record.board_uri(), Some(&board_uri()));
        assert_eq!(record.collection(), Collection::Op);
    }
}
