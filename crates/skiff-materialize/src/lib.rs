//! Materialization engine: fold a base task plus its unordered,
//! multi-author op log into one deterministic effective view.
//!
//! Materialization is a pure, synchronous, read-only fold - safely
//! re-runnable any number of times with no side effects. Callers invoke it
//! on every read; there is no caching layer here.
//!
//! # Algorithm
//!
//! 1. Deduplicate tasks by record URI (sync races can produce duplicates)
//! 2. Group ops by target task
//! 3. Seed per-field `{value, timestamp, author}` state from the base task
//! 4. Partition each task's ops into applied and pending using the trust
//!    model; an op is applied whole or held whole, never split per field
//! 5. Fold applied ops in timestamp order with last-write-wins per field:
//!    a value replaces the current one only if its timestamp is strictly
//!    greater, so equal timestamps keep the first-folded value
//!
//! Permission is evaluated against the trust set passed in *now*, not the
//! set at op authorship time: granting trust makes previously pending ops
//! apply on the next materialization, and revoking un-applies them.

use skiff_trust::{decide, is_visible, Decision, Policy};
use skiff_types::{position, BoardPolicy, Did, Op, OpFields, OpKind, RecordUri, Stored, Task};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Everything about a board the fold needs to make trust decisions:
/// owner, viewer, current trust set, policy, and the approval set.
#[derive(Debug, Clone)]
pub struct BoardContext {
    /// The board's own URI
    pub board: RecordUri,
    /// The board owner (the board record's author)
    pub owner: Did,
    /// The identity the view is being rendered for
    pub viewer: Did,
    /// Identities holding a trust grant from the owner, as of now
    pub trusted: HashSet<Did>,
    /// The simple policy flag
    pub open: bool,
    /// Rich per-operation rules, when configured
    pub policy: Option<BoardPolicy>,
    /// URIs of untrusted content accepted onto the board
    pub approvals: HashSet<RecordUri>,
}

impl BoardContext {
    fn policy(&self) -> Policy<'_> {
        match &self.policy {
            Some(rules) => Policy::Rules(rules),
            None => Policy::Open(self.open),
        }
    }
}

/// The operation kinds an op's touched fields map to.
///
/// `position`/`order` count as a move when the op also changes the column,
/// otherwise as a reorder within the column. Label changes are treated as
/// description-level metadata edits.
pub fn op_kinds(fields: &OpFields) -> Vec<OpKind> {
    let mut kinds = Vec::new();
    if fields.title.is_some() {
        kinds.push(OpKind::EditTitle);
    }
    if fields.description.is_some() {
        kinds.push(OpKind::EditDescription);
    }
    if fields.column_id.is_some() {
        kinds.push(OpKind::MoveTask);
    }
    if fields.position.is_some() || fields.order.is_some() {
        if fields.column_id.is_some() {
            kinds.push(OpKind::MoveTask);
        } else {
            kinds.push(OpKind::Reorder);
        }
    }
    if fields.label_ids.is_some() {
        kinds.push(OpKind::EditDescription);
    }
    kinds.sort();
    kinds.dedup();
    kinds
}

/// Per-field last-write-wins state.
#[derive(Debug, Clone)]
struct Slot<T> {
    value: T,
    at: u64,
    by: Did,
}

impl<T> Slot<T> {
    fn seed(value: T, at: u64, by: &Did) -> Self {
        Self {
            value,
            at,
            by: by.clone(),
        }
    }

    /// Replace only on a strictly greater timestamp.
    fn apply(&mut self, value: T, at: u64, by: &Did) {
        if at > self.at {
            self.value = value;
            self.at = at;
            self.by = by.clone();
        }
    }
}

/// A task's effective view: the base record, the derived field values, and
/// the op partition the derivation used.
#[derive(Debug, Clone)]
pub struct EffectiveTask {
    /// The base record as stored
    pub task: Stored<Task>,
    pub title: String,
    pub description: Option<String>,
    pub column_id: String,
    /// The effective fractional position (derived from legacy `order` when
    /// the base record predates positions)
    pub position: String,
    pub label_ids: Vec<String>,
    /// Author of the most recent applied change to any field
    pub last_modified_by: Did,
    pub last_modified_at: u64,
    /// Whether the viewer in the context should see this task at all
    pub visible: bool,
    /// Ops folded into the effective values, in fold order
    pub applied: Vec<Stored<Op>>,
    /// Ops held as proposals for lack of trust
    pub pending: Vec<Stored<Op>>,
}

/// Materialize every task on a board.
///
/// Ops targeting tasks not present in `tasks` are orphans (their target was
/// deleted) and are ignored. Output order follows the deduplicated input
/// order of `tasks`.
pub fn materialize_board(
    tasks: &[Stored<Task>],
    ops: &[Stored<Op>],
    ctx: &BoardContext,
) -> Vec<EffectiveTask> {
    // Dedup by URI, first occurrence wins, input order preserved.
    let mut seen = HashSet::new();
    let unique: Vec<&Stored<Task>> = tasks.iter().filter(|t| seen.insert(&t.uri)).collect();

    // Group ops by target.
    let mut by_target: HashMap<&RecordUri, Vec<&Stored<Op>>> = HashMap::new();
    for op in ops {
        by_target.entry(&op.value.target).or_default().push(op);
    }

    unique
        .into_iter()
        .map(|task| {
            let task_ops = by_target.remove(&task.uri).unwrap_or_default();
            materialize_task(task, task_ops, ctx)
        })
        .collect()
}

/// Materialize a single task from its op log.
pub fn materialize_task(
    task: &Stored<Task>,
    task_ops: Vec<&Stored<Op>>,
    ctx: &BoardContext,
) -> EffectiveTask {
    let author = task.author().clone();
    let base = &task.value;
    let seeded_at = base.created_at;

    let seed_position = base
        .position
        .clone()
        .unwrap_or_else(|| position::from_order(base.order.unwrap_or(0)));

    let mut title = Slot::seed(base.title.clone(), seeded_at, &author);
    let mut description = Slot::seed(base.description.clone(), seeded_at, &author);
    let mut column_id = Slot::seed(base.column_id.clone(), seeded_at, &author);
    let mut position = Slot::seed(seed_position, seeded_at, &author);
    let mut label_ids = Slot::seed(
        base.label_ids.clone().unwrap_or_default(),
        seeded_at,
        &author,
    );

    let (mut applied, mut pending) = partition_ops(task_ops, &author, ctx);

    // Stable sorts: equal timestamps keep arrival order, and the fold's
    // strictly-greater rule then keeps the first value.
    applied.sort_by_key(|op| op.value.created_at);
    pending.sort_by_key(|op| op.value.created_at);

    for op in &applied {
        let by = op.author();
        let at = op.value.created_at;
        let fields = &op.value.fields;
        if let Some(v) = &fields.title {
            title.apply(v.clone(), at, by);
        }
        if let Some(v) = &fields.description {
            description.apply(Some(v.clone()), at, by);
        }
        if let Some(v) = &fields.column_id {
            column_id.apply(v.clone(), at, by);
        }
        if let Some(v) = &fields.position {
            position.apply(v.clone(), at, by);
        } else if let Some(o) = fields.order {
            position.apply(position::from_order(o), at, by);
        }
        if let Some(v) = &fields.label_ids {
            label_ids.apply(v.clone(), at, by);
        }
    }

    // The field with the latest applied write names the whole entity's
    // last modifier.
    let mut last_modified_at = title.at;
    let mut last_modified_by = title.by.clone();
    for (at, by) in [
        (description.at, &description.by),
        (column_id.at, &column_id.by),
        (position.at, &position.by),
        (label_ids.at, &label_ids.by),
    ] {
        if at > last_modified_at {
            last_modified_at = at;
            last_modified_by = by.clone();
        }
    }

    let visible = is_visible(
        &author,
        &ctx.viewer,
        &ctx.owner,
        &ctx.trusted,
        ctx.open,
        &ctx.approvals,
        &task.uri,
    );

    trace!(
        task = %task.uri,
        applied = applied.len(),
        pending = pending.len(),
        "materialized task"
    );

    EffectiveTask {
        task: task.clone(),
        title: title.value,
        description: description.value,
        column_id: column_id.value,
        position: position.value,
        label_ids: label_ids.value,
        last_modified_by,
        last_modified_at,
        visible,
        applied: applied.into_iter().cloned().collect(),
        pending: pending.into_iter().cloned().collect(),
    }
}

/// Split a task's ops into applied and pending.
///
/// Ops from the board owner, the task's own author, or the current viewer
/// always apply. Any other author's op applies only if *every* field it
/// touches is individually permitted; otherwise the whole op is held.
fn partition_ops<'a>(
    task_ops: Vec<&'a Stored<Op>>,
    task_author: &Did,
    ctx: &BoardContext,
) -> (Vec<&'a Stored<Op>>, Vec<&'a Stored<Op>>) {
    let mut applied = Vec::new();
    let mut pending = Vec::new();

    for op in task_ops {
        let op_author = op.author();
        if op_author == &ctx.owner || op_author == task_author || op_author == &ctx.viewer {
            applied.push(op);
            continue;
        }

        let column = op.value.fields.column_id.as_deref();
        let all_permitted = op_kinds(&op.value.fields).into_iter().all(|kind| {
            decide(
                op_author,
                &ctx.owner,
                &ctx.trusted,
                ctx.policy(),
                kind,
                column,
                false,
            ) == Decision::Allowed
        });

        if all_permitted {
            applied.push(op);
        } else {
            pending.push(op);
        }
    }

    (applied, pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_types::{Collection, PolicyRule, Scope, SyncStatus};

    fn did(s: &str) -> Did {
        Did::new(format!("did:plc:{s}")).unwrap()
    }

    fn board_uri() -> RecordUri {
        "at://did:plc:owner/app.skiff.board/b1".parse().unwrap()
    }

    fn task_record(author: &str, rkey: &str, title: &str, created_at: u64) -> Stored<Task> {
        let uri = RecordUri::new(did(author), Collection::Task, rkey).unwrap();
        Stored::new(
            uri,
            Task {
                title: title.to_string(),
                description: None,
                column_id: "todo".to_string(),
                board_uri: board_uri(),
                position: Some("a1".to_string()),
                order: None,
                label_ids: None,
                created_at,
                updated_at: None,
            },
            SyncStatus::Synced,
        )
    }

    fn op_record(
        author: &str,
        rkey: &str,
        target: &RecordUri,
        fields: OpFields,
        created_at: u64,
    ) -> Stored<Op> {
        let uri = RecordUri::new(did(author), Collection::Op, rkey).unwrap();
        Stored::new(
            uri,
            Op {
                target: target.clone(),
                board_uri: board_uri(),
                fields,
                created_at,
            },
            SyncStatus::Synced,
        )
    }

    fn ctx(viewer: &str) -> BoardContext {
        BoardContext {
            board: board_uri(),
            owner: did("owner"),
            viewer: did(viewer),
            trusted: HashSet::new(),
            open: true,
            policy: None,
            approvals: HashSet::new(),
        }
    }

    #[test]
    fn disjoint_fields_commute() {
        let task = task_record("alice", "t1", "Original", 100);
        let op_title = op_record(
            "alice",
            "o1",
            &task.uri,
            OpFields {
                title: Some("Renamed".into()),
                ..Default::default()
            },
            200,
        );
        let op_desc = op_record(
            "alice",
            "o2",
            &task.uri,
            OpFields {
                description: Some("Details".into()),
                ..Default::default()
            },
            150,
        );

        let forward = materialize_board(
            &[task.clone()],
            &[op_title.clone(), op_desc.clone()],
            &ctx("alice"),
        );
        let backward = materialize_board(&[task], &[op_desc, op_title], &ctx("alice"));

        for view in [&forward[0], &backward[0]] {
            assert_eq!(view.title, "Renamed");
            assert_eq!(view.description.as_deref(), Some("Details"));
            assert_eq!(view.applied.len(), 2);
        }
    }

    #[test]
    fn last_write_wins_per_field() {
        let task = task_record("alice", "t1", "v0", 100);
        let early = op_record(
            "alice",
            "o1",
            &task.uri,
            OpFields {
                title: Some("v1".into()),
                ..Default::default()
            },
            200,
        );
        let late = op_record(
            "alice",
            "o2",
            &task.uri,
            OpFields {
                title: Some("v2".into()),
                ..Default::default()
            },
            300,
        );

        // Arrival order must not matter.
        let views = materialize_board(&[task], &[late, early], &ctx("alice"));
        assert_eq!(views[0].title, "v2");
        assert_eq!(views[0].last_modified_at, 300);
    }

    #[test]
    fn op_replay_is_idempotent() {
        let task = task_record("alice", "t1", "v0", 100);
        let op = op_record(
            "alice",
            "o1",
            &task.uri,
            OpFields {
                title: Some("v1".into()),
                ..Default::default()
            },
            200,
        );

        let once = materialize_board(&[task.clone()], &[op.clone()], &ctx("alice"));
        let twice = materialize_board(&[task], &[op.clone(), op], &ctx("alice"));
        assert_eq!(once[0].title, twice[0].title);
        assert_eq!(once[0].last_modified_at, twice[0].last_modified_at);
    }

    #[test]
    fn equal_timestamps_keep_first_arrival() {
        let task = task_record("alice", "t1", "v0", 100);
        let first = op_record(
            "alice",
            "o1",
            &task.uri,
            OpFields {
                title: Some("first".into()),
                ..Default::default()
            },
            200,
        );
        let second = op_record(
            "alice",
            "o2",
            &task.uri,
            OpFields {
                title: Some("second".into()),
                ..Default::default()
            },
            200,
        );

        let views = materialize_board(&[task], &[first, second], &ctx("alice"));
        assert_eq!(views[0].title, "first");
    }

    #[test]
    fn duplicate_task_rows_are_deduplicated() {
        let task = task_record("alice", "t1", "Original", 100);
        let views = materialize_board(&[task.clone(), task], &[], &ctx("alice"));
        assert_eq!(views.len(), 1);
    }

    #[test]
    fn untrusted_op_is_held_whole() {
        // Mallory's op touches title and column; the rich policy permits
        // moves for anyone but not title edits, so the entire op is pending.
        let task = task_record("alice", "t1", "Original", 100);
        let op = op_record(
            "mallory",
            "o1",
            &task.uri,
            OpFields {
                title: Some("Hijacked".into()),
                column_id: Some("done".into()),
                ..Default::default()
            },
            200,
        );

        let mut context = ctx("alice");
        context.policy = Some(BoardPolicy {
            rules: vec![PolicyRule {
                op: OpKind::MoveTask,
                scope: Scope::Anyone,
                column_id: None,
            }],
        });

        let views = materialize_board(&[task], &[op], &context);
        assert_eq!(views[0].title, "Original");
        assert_eq!(views[0].column_id, "todo");
        assert_eq!(views[0].applied.len(), 0);
        assert_eq!(views[0].pending.len(), 1);
    }

    #[test]
    fn untrusted_move_applies_when_permitted() {
        let task = task_record("alice", "t1", "Original", 100);
        let op = op_record(
            "mallory",
            "o1",
            &task.uri,
            OpFields {
                column_id: Some("done".into()),
                position: Some("b2".into()),
                ..Default::default()
            },
            200,
        );

        let mut context = ctx("alice");
        context.policy = Some(BoardPolicy {
            rules: vec![PolicyRule {
                op: OpKind::MoveTask,
                scope: Scope::Anyone,
                column_id: None,
            }],
        });

        let views = materialize_board(&[task], &[op], &context);
        assert_eq!(views[0].column_id, "done");
        assert_eq!(views[0].position, "b2");
        assert_eq!(views[0].applied.len(), 1);
    }

    #[test]
    fn viewer_own_ops_always_apply() {
        let task = task_record("alice", "t1", "Original", 100);
        let op = op_record(
            "viewer",
            "o1",
            &task.uri,
            OpFields {
                title: Some("My optimistic edit".into()),
                ..Default::default()
            },
            200,
        );

        let views = materialize_board(&[task], &[op], &ctx("viewer"));
        assert_eq!(views[0].title, "My optimistic edit");
    }

    #[test]
    fn granting_trust_applies_pending_ops_on_rerender() {
        // X's task; untrusted Y edits the title. Until trust is granted the
        // edit is pending; after granting, re-materialization applies it
        // with no new op. Permission reads the *current* trust set.
        let task = task_record("x", "t1", "Foo", 5);
        let own_edit = op_record(
            "x",
            "o1",
            &task.uri,
            OpFields {
                title: Some("Foo".into()),
                ..Default::default()
            },
            10,
        );
        let foreign_edit = op_record(
            "y",
            "o2",
            &task.uri,
            OpFields {
                title: Some("Bar".into()),
                ..Default::default()
            },
            20,
        );

        let mut context = ctx("viewer");
        let before = materialize_board(
            &[task.clone()],
            &[own_edit.clone(), foreign_edit.clone()],
            &context,
        );
        assert_eq!(before[0].title, "Foo");
        assert_eq!(before[0].pending.len(), 1);

        context.trusted.insert(did("y"));
        let after = materialize_board(&[task], &[own_edit, foreign_edit], &context);
        assert_eq!(after[0].title, "Bar");
        assert_eq!(after[0].pending.len(), 0);
    }

    #[test]
    fn legacy_order_seeds_position() {
        let mut task = task_record("alice", "t1", "Old client task", 100);
        task.value.position = None;
        task.value.order = Some(3);

        let views = materialize_board(&[task], &[], &ctx("alice"));
        assert_eq!(views[0].position, position::from_order(3));
    }

    #[test]
    fn unapproved_stranger_task_is_hidden_from_others() {
        let task = task_record("stranger", "t1", "Proposal", 100);

        let as_owner = materialize_board(&[task.clone()], &[], &ctx("owner"));
        assert!(!as_owner[0].visible);

        let as_author = materialize_board(&[task.clone()], &[], &ctx("stranger"));
        assert!(as_author[0].visible);

        let mut approved = ctx("owner");
        approved.approvals.insert(task.uri.clone());
        let views = materialize_board(&[task], &[], &approved);
        assert!(views[0].visible);
    }

    #[test]
    fn orphaned_ops_are_ignored() {
        let task = task_record("alice", "t1", "Original", 100);
        let gone: RecordUri = "at://did:plc:alice/app.skiff.task/deleted".parse().unwrap();
        let orphan = op_record(
            "alice",
            "o1",
            &gone,
            OpFields {
                title: Some("Ghost".into()),
                ..Default::default()
            },
            200,
        );

        let views = materialize_board(&[task], &[orphan], &ctx("alice"));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].title, "Original");
        assert!(views[0].applied.is_empty());
    }
}
