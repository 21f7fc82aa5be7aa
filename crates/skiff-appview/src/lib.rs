//! Canonical aggregator for the task-board network.
//!
//! Consumes the firehose through [`skiff_ingest`], stores every valid
//! record in a RocksDB-backed canonical store, and serves whole boards
//! over HTTP with per-board WebSocket change nudges.
//!
//! # Architecture
//!
//! ```text
//!  firehose ──> IngestClient ──> AppviewSink ──> CanonicalStore (RocksDB)
//!                                     │
//!                                     v
//!                               BoardNotifier ──> WebSocket sessions
//!                                                      ^
//!  browsers  <── GET /api/v1/board ────────────────────┘
//! ```
//!
//! The store doubles as the ingestion cursor store, so restarts resume
//! from the last indexed event.

pub mod config;
pub mod error;
pub mod node;
pub mod notify;
pub mod server;
pub mod sink;
pub mod store;
pub mod telemetry;

pub use config::AppviewConfig;
pub use error::{Error, Result};
pub use node::AppviewNode;
pub use notify::BoardNotifier;
pub use server::{build_router, serve, AppState};
pub use sink::AppviewSink;
pub use store::{board_key, CanonicalRow, CanonicalStore};
