//! Skiff data model - records, identities, and ordering keys.
//!
//! Skiff is a collaborative task board whose records live in users' own
//! federated repositories and replicate through a public event firehose.
//! This crate defines everything the convergence engine shares:
//!
//! - **Identities**: DIDs, collections, and `at://` record URIs
//! - **Records**: Board, Task, Op, Trust, Approval, Comment, Reaction,
//!   plus the schema gate that validates raw network payloads
//! - **Policy**: board policy vocabulary (operation kinds, scope rules)
//! - **Positions**: fractional ordering keys with legacy-order expansion

pub mod error;
pub mod identity;
pub mod policy;
pub mod position;
pub mod records;

pub use error::{Error, Result};
pub use identity::{Collection, Did, RecordUri};
pub use policy::{BoardPolicy, OpKind, PolicyRule, Scope};
pub use records::{
    now_micros, Approval, Board, Column, Comment, KnownParticipant, Label, Op, OpFields, Reaction,
    Record, Stored, SyncStatus, Task, TrustGrant,
};
