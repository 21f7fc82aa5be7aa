//! Trust & permission model for Skiff boards.
//!
//! Pure, side-effect-free decision functions. Every decision is a function
//! of `(actor, owner, trusted set, policy, operation kind)` - no hidden
//! state, no I/O, no retries. The materialization engine and UI gating both
//! query this synchronously.
//!
//! Write permission and visibility are separate questions: an untrusted
//! author may be *allowed* to propose a task on an open board, while that
//! task stays *hidden* from other viewers until an approval lands.

use skiff_types::{BoardPolicy, Did, OpKind, RecordUri, Scope};
use std::collections::HashSet;

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The operation takes effect immediately
    Allowed,
    /// The operation is held as a proposal awaiting approval
    Pending,
    /// The operation has no effect for this actor
    Denied,
}

/// The policy in force on a board: the simple `open` flag, or rich
/// per-operation scope rules when the owner has configured them.
#[derive(Debug, Clone, Copy)]
pub enum Policy<'a> {
    /// `open = true` accepts proposals from anyone; `false` is owner/trusted only
    Open(bool),
    /// Rich rule set; the broadest matching rule wins per (op, column)
    Rules(&'a BoardPolicy),
}

/// Whether an actor holds elevated write privileges on a board.
pub fn is_trusted(actor: &Did, owner: &Did, trusted: &HashSet<Did>) -> bool {
    actor == owner || trusted.contains(actor)
}

/// Decide whether `actor` may perform `kind` on the board.
///
/// `column_id` scopes rich-policy rules; `is_record_author` is true when the
/// actor authored the record being operated on (relevant to `author_only`
/// scoped rules). Trusted actors (including the owner) are always allowed.
pub fn decide(
    actor: &Did,
    owner: &Did,
    trusted: &HashSet<Did>,
    policy: Policy<'_>,
    kind: OpKind,
    column_id: Option<&str>,
    is_record_author: bool,
) -> Decision {
    if is_trusted(actor, owner, trusted) {
        return Decision::Allowed;
    }

    match policy {
        Policy::Open(false) => Decision::Denied,
        Policy::Open(true) => {
            if kind.creates_content() {
                Decision::Pending
            } else {
                Decision::Denied
            }
        }
        Policy::Rules(rules) => match rules.effective_scope(kind, column_id) {
            Scope::Anyone => {
                // Content-creating kinds still go through the proposal
                // flow, exactly as the simple open flag treats them.
                if kind.creates_content() {
                    Decision::Pending
                } else {
                    Decision::Allowed
                }
            }
            Scope::Trusted => Decision::Denied,
            Scope::AuthorOnly => {
                if is_record_author {
                    Decision::Allowed
                } else {
                    Decision::Denied
                }
            }
        },
    }
}

/// Whether content authored by `author` is visible to `viewer`.
///
/// Untrusted authors' content is hidden from other viewers unless the board
/// is open and the content's URI has been approved. Authors always see their
/// own content.
pub fn is_visible(
    author: &Did,
    viewer: &Did,
    owner: &Did,
    trusted: &HashSet<Did>,
    open: bool,
    approvals: &HashSet<RecordUri>,
    uri: &RecordUri,
) -> bool {
    if is_trusted(author, owner, trusted) {
        return true;
    }
    if viewer == author {
        return true;
    }
    open && approvals.contains(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_types::PolicyRule;

    fn did(s: &str) -> Did {
        Did::new(format!("did:plc:{s}")).unwrap()
    }

    fn task_uri(author: &str) -> RecordUri {
        format!("at://did:plc:{author}/app.skiff.task/t1")
            .parse()
            .unwrap()
    }

    #[test]
    fn owner_and_trusted_are_always_allowed() {
        let owner = did("owner");
        let helper = did("helper");
        let trusted: HashSet<Did> = [helper.clone()].into();

        for kind in [OpKind::CreateTask, OpKind::EditTitle, OpKind::MoveTask] {
            assert_eq!(
                decide(&owner, &owner, &trusted, Policy::Open(false), kind, None, false),
                Decision::Allowed
            );
            assert_eq!(
                decide(&helper, &owner, &trusted, Policy::Open(false), kind, None, false),
                Decision::Allowed
            );
        }
    }

    #[test]
    fn open_board_turns_content_creation_into_proposals() {
        let owner = did("owner");
        let stranger = did("stranger");
        let trusted = HashSet::new();

        assert_eq!(
            decide(
                &stranger,
                &owner,
                &trusted,
                Policy::Open(true),
                OpKind::CreateTask,
                None,
                false
            ),
            Decision::Pending
        );
        assert_eq!(
            decide(
                &stranger,
                &owner,
                &trusted,
                Policy::Open(true),
                OpKind::Comment,
                None,
                false
            ),
            Decision::Pending
        );
        // Edits are not proposals under the simple policy.
        assert_eq!(
            decide(
                &stranger,
                &owner,
                &trusted,
                Policy::Open(true),
                OpKind::EditTitle,
                None,
                false
            ),
            Decision::Denied
        );
    }

    #[test]
    fn closed_board_denies_strangers_everything() {
        let owner = did("owner");
        let stranger = did("stranger");
        let trusted = HashSet::new();

        for kind in [
            OpKind::CreateTask,
            OpKind::EditTitle,
            OpKind::EditDescription,
            OpKind::MoveTask,
            OpKind::Reorder,
            OpKind::Comment,
        ] {
            assert_eq!(
                decide(&stranger, &owner, &trusted, Policy::Open(false), kind, None, false),
                Decision::Denied
            );
        }
    }

    #[test]
    fn rich_policy_anyone_scope_allows_edits() {
        let owner = did("owner");
        let stranger = did("stranger");
        let trusted = HashSet::new();
        let policy = BoardPolicy {
            rules: vec![PolicyRule {
                op: OpKind::MoveTask,
                scope: Scope::Anyone,
                column_id: None,
            }],
        };

        assert_eq!(
            decide(
                &stranger,
                &owner,
                &trusted,
                Policy::Rules(&policy),
                OpKind::MoveTask,
                Some("doing"),
                false
            ),
            Decision::Allowed
        );
        // Uncovered operations fall back to author-only.
        assert_eq!(
            decide(
                &stranger,
                &owner,
                &trusted,
                Policy::Rules(&policy),
                OpKind::EditTitle,
                None,
                false
            ),
            Decision::Denied
        );
    }

    #[test]
    fn rich_policy_column_scoping() {
        let owner = did("owner");
        let stranger = did("stranger");
        let trusted = HashSet::new();
        let policy = BoardPolicy {
            rules: vec![
                PolicyRule {
                    op: OpKind::Reorder,
                    scope: Scope::Anyone,
                    column_id: Some("triage".into()),
                },
                PolicyRule {
                    op: OpKind::Reorder,
                    scope: Scope::Trusted,
                    column_id: None,
                },
            ],
        };

        assert_eq!(
            decide(
                &stranger,
                &owner,
                &trusted,
                Policy::Rules(&policy),
                OpKind::Reorder,
                Some("triage"),
                false
            ),
            Decision::Allowed
        );
        assert_eq!(
            decide(
                &stranger,
                &owner,
                &trusted,
                Policy::Rules(&policy),
                OpKind::Reorder,
                Some("done"),
                false
            ),
            Decision::Denied
        );
    }

    #[test]
    fn author_only_scope_admits_the_record_author() {
        let owner = did("owner");
        let author = did("author");
        let trusted = HashSet::new();
        let policy = BoardPolicy::default();

        assert_eq!(
            decide(
                &author,
                &owner,
                &trusted,
                Policy::Rules(&policy),
                OpKind::EditTitle,
                None,
                true
            ),
            Decision::Allowed
        );
        assert_eq!(
            decide(
                &author,
                &owner,
                &trusted,
                Policy::Rules(&policy),
                OpKind::EditTitle,
                None,
                false
            ),
            Decision::Denied
        );
    }

    #[test]
    fn visibility_requires_approval_for_untrusted_authors() {
        let owner = did("owner");
        let author = did("stranger");
        let viewer = did("viewer");
        let trusted = HashSet::new();
        let uri = task_uri("stranger");

        let mut approvals = HashSet::new();

        // Hidden from other viewers before approval.
        assert!(!is_visible(
            &author, &viewer, &owner, &trusted, true, &approvals, &uri
        ));
        // The author always sees their own content.
        assert!(is_visible(
            &author, &author, &owner, &trusted, true, &approvals, &uri
        ));

        approvals.insert(uri.clone());
        assert!(is_visible(
            &author, &viewer, &owner, &trusted, true, &approvals, &uri
        ));

        // Approval on a closed board does not make it visible.
        assert!(!is_visible(
            &author, &viewer, &owner, &trusted, false, &approvals, &uri
        ));
    }

    #[test]
    fn trusted_author_content_is_always_visible() {
        let owner = did("owner");
        let viewer = did("viewer");
        let trusted: HashSet<Did> = [did("helper")].into();
        let uri = task_uri("helper");

        assert!(is_visible(
            &did("helper"),
            &viewer,
            &owner,
            &trusted,
            false,
            &HashSet::new(),
            &uri
        ));
    }
}
