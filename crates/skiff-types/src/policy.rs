//! Board policy data: operation kinds and per-operation scope rules.
//!
//! A board either carries the simple `open` flag or a rich rule set. The
//! decision logic itself lives in `skiff-trust`; this module only defines the
//! vocabulary that board records serialize.

use serde::{Deserialize, Serialize};

/// The kinds of write operation a board policy can scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Creating a new task on the board
    CreateTask,
    /// Editing a task's title
    EditTitle,
    /// Editing a task's description
    EditDescription,
    /// Moving a task to another column
    MoveTask,
    /// Reordering a task within its column
    Reorder,
    /// Commenting on a task
    Comment,
}

impl OpKind {
    /// Whether this kind creates new visible content (and therefore goes
    /// through the proposal/approval flow for untrusted authors).
    pub fn creates_content(&self) -> bool {
        matches!(self, OpKind::CreateTask | OpKind::Comment)
    }
}

/// Who an operation is open to. Ordered from narrowest to broadest; when
/// several rules match, the broadest wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Only the targeted record's own author (owner and trusted always pass)
    AuthorOnly,
    /// Owner and identities with a trust grant on the board
    Trusted,
    /// Any authenticated identity
    Anyone,
}

/// One scope rule, optionally restricted to a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// The operation kind the rule covers
    pub op: OpKind,
    /// Who may perform it
    pub scope: Scope,
    /// If set, the rule only applies to this column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
}

/// A rich per-operation rule set for a board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPolicy {
    /// Scope rules; multiple rules may cover the same operation
    pub rules: Vec<PolicyRule>,
}

impl BoardPolicy {
    /// The effective scope for an (operation, column) pair: the broadest
    /// matching rule. Column-scoped rules only match their column; rules
    /// without a column match everywhere. No matching rule means the
    /// operation stays author-only.
    pub fn effective_scope(&self, op: OpKind, column_id: Option<&str>) -> Scope {
        self.rules
            .iter()
            .filter(|r| r.op == op)
            .filter(|r| match (&r.column_id, column_id) {
                (None, _) => true,
                (Some(rule_col), Some(col)) => rule_col == col,
                (Some(_), None) => false,
            })
            .map(|r| r.scope)
            .max()
            .unwrap_or(Scope::AuthorOnly)
    }
}
