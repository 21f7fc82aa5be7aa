//! The ingestion client: one long-lived connection, a durable cursor, and
//! a reconnect loop that survives network churn.
//!
//! State machine: `Disconnected -> Connecting -> Connected`, back to
//! `Disconnected` on close or error. Reconnection uses exponential backoff
//! (1s doubling to a 30s ceiling, reset on success); while the host is
//! offline the loop parks on the network signal instead of burning backoff
//! cycles. Disconnecting sets a do-not-reconnect flag checked before every
//! retry, so no reconnect loop outlives shutdown.

use crate::error::{Error, Result};
use crate::sink::{CursorStore, FirehoseConn, RecordEvent, RecordSink, Transport};
use crate::wire::{CommitOp, FirehoseFrame};
use skiff_types::{now_micros, Collection, Record, RecordUri};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

/// Configuration for the ingestion client.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Collections to subscribe to
    pub collections: Vec<Collection>,
    /// How long the firehose backend retains events
    pub retention: Duration,
    /// Safety margin subtracted from retention when judging cursor
    /// staleness; a cursor older than `retention - margin` is discarded
    pub safety_margin: Duration,
    /// How often the cursor is persisted while connected
    pub cursor_save_interval: Duration,
    /// Initial reconnect delay
    pub backoff_floor: Duration,
    /// Reconnect delay ceiling
    pub backoff_ceiling: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            collections: Collection::ALL.to_vec(),
            retention: Duration::from_secs(72 * 3600),
            safety_margin: Duration::from_secs(48 * 3600),
            cursor_save_interval: Duration::from_secs(5),
            backoff_floor: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(30),
        }
    }
}

/// Connection state, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// Where to resume from, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// A fresh persisted cursor exists; resume the stream from it
    FromCursor(u64),
    /// No usable cursor (missing or stale): the caller must run a full
    /// backfill of known repositories before relying on the stream
    Backfill,
}

/// Exponential reconnect backoff.
#[derive(Debug)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            next: floor,
        }
    }

    /// The delay to wait before the next attempt; doubles up to the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.ceiling);
        delay
    }

    /// Back to the floor, called after a successful connect.
    pub fn reset(&mut self) {
        self.next = self.floor;
    }
}

/// Create the network-state signal the client watches. Send `false` on
/// network-down and `true` on network-up.
pub fn online_channel(initially_online: bool) -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(initially_online)
}

/// Handle for stopping a running client from outside.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl IngestHandle {
    /// Set the do-not-reconnect flag and wake the client.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// A resumable consumer of the firehose, generic over transport, sink, and
/// cursor storage so the same state machine serves both the browser replica
/// and the server-side appview.
pub struct IngestClient<T, S, C> {
    config: IngestConfig,
    transport: T,
    sink: S,
    cursors: C,
    state: ClientState,
    cursor: Option<u64>,
    cursor_dirty: bool,
    backoff: Backoff,
    online: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
}

impl<T, S, C> IngestClient<T, S, C>
where
    T: Transport,
    S: RecordSink,
    C: CursorStore,
{
    /// Build a client and its shutdown handle.
    pub fn new(
        config: IngestConfig,
        transport: T,
        sink: S,
        cursors: C,
        online: watch::Receiver<bool>,
    ) -> (Self, IngestHandle) {
        let (shutdown_tx, shutdown) = watch::channel(false);
        let backoff = Backoff::new(config.backoff_floor, config.backoff_ceiling);
        (
            Self {
                config,
                transport,
                sink,
                cursors,
                state: ClientState::Disconnected,
                cursor: None,
                cursor_dirty: false,
                backoff,
                online,
                shutdown,
            },
            IngestHandle { shutdown_tx },
        )
    }

    /// Current connection state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The highest event time observed so far.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Load the persisted cursor and decide where to resume. A cursor older
    /// than the retention window (less the safety margin) is silently
    /// discarded and the caller is told to backfill instead.
    pub fn prepare(&mut self) -> Result<Resume> {
        let stored = self.cursors.load()?;
        let resume = self.resume_from(stored, now_micros());
        if let Resume::FromCursor(c) = resume {
            self.cursor = Some(c);
        }
        Ok(resume)
    }

    /// Pure staleness rule, separated for testability.
    pub fn resume_from(&self, stored: Option<u64>, now_us: u64) -> Resume {
        let Some(cursor) = stored else {
            return Resume::Backfill;
        };
        let window = self
            .config
            .retention
            .saturating_sub(self.config.safety_margin);
        let oldest_usable = now_us.saturating_sub(window.as_micros() as u64);
        if cursor < oldest_usable {
            warn!(
                cursor,
                oldest_usable, "persisted cursor is older than the retention window; backfill required"
            );
            return Resume::Backfill;
        }
        Resume::FromCursor(cursor)
    }

    /// Run until shutdown. Reconnects with backoff on failure, suspends
    /// while offline, and persists the cursor on an interval and at exit.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            if !*self.online.borrow() {
                self.state = ClientState::Disconnected;
                debug!("offline; suspending reconnection");
                tokio::select! {
                    res = self.online.changed() => {
                        if res.is_err() {
                            warn!("network signal source dropped; stopping");
                            break;
                        }
                    }
                    _ = self.shutdown.changed() => {}
                }
                continue;
            }

            self.state = ClientState::Connecting;
            match self
                .transport
                .connect(&self.config.collections, self.cursor)
                .await
            {
                Ok(conn) => {
                    info!(cursor = ?self.cursor, "firehose connected");
                    self.state = ClientState::Connected;
                    self.backoff.reset();
                    self.read_loop(conn).await;
                    self.state = ClientState::Disconnected;
                }
                Err(e) => {
                    self.state = ClientState::Disconnected;
                    let delay = self.backoff.next_delay();
                    warn!(error = %e, ?delay, "firehose connect failed; backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => {}
                        res = self.online.changed() => {
                            // Network state flipped: either resume at once
                            // (up) or park in the offline branch (down).
                            if res.is_err() {
                                warn!("network signal source dropped; stopping");
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.persist_cursor();
        info!("ingestion client stopped");
        Ok(())
    }

    /// Consume frames until close, error, shutdown, or network-down.
    async fn read_loop(&mut self, mut conn: T::Conn) {
        let mut save = tokio::time::interval(self.config.cursor_save_interval);
        save.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = conn.next_frame() => match frame {
                    Ok(Some(frame)) => {
                        if let Err(e) = self.handle_frame(frame) {
                            // Sink/storage failures are not malformed input;
                            // surface loudly but keep the stream alive.
                            error!(error = %e, "failed to apply firehose event");
                        }
                    }
                    Ok(None) => {
                        info!("firehose closed the stream");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "firehose read error");
                        break;
                    }
                },
                _ = save.tick() => self.persist_cursor(),
                _ = self.shutdown.changed() => break,
                res = self.online.changed() => {
                    if res.is_err() || !*self.online.borrow() {
                        info!("network down; dropping connection");
                        break;
                    }
                }
            }
        }

        self.persist_cursor();
    }

    /// Apply one frame: advance the cursor, validate, and dispatch to the
    /// sink. Malformed payloads are dropped with a warning - ingestion
    /// never crashes on untrusted network input.
    fn handle_frame(&mut self, frame: FirehoseFrame) -> Result<()> {
        if frame.kind != "commit" {
            trace!(kind = %frame.kind, "ignoring non-commit frame");
            return Ok(());
        }
        self.observe(frame.time_us);

        let Some(commit) = frame.commit else {
            trace!("commit frame without commit body; ignored");
            return Ok(());
        };

        let Ok(collection) = commit.collection.parse::<Collection>() else {
            trace!(collection = %commit.collection, "unwatched collection; ignored");
            return Ok(());
        };

        let uri = match RecordUri::new(frame.did, collection, commit.rkey) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(error = %e, "malformed record identity; event dropped");
                return Ok(());
            }
        };

        match commit.operation {
            CommitOp::Delete => {
                if let Some(board) = self.sink.delete(&uri)? {
                    debug!(%uri, %board, "record deleted");
                }
            }
            CommitOp::Create | CommitOp::Update => {
                let Some(raw) = commit.record else {
                    warn!(%uri, "create/update commit without record payload; dropped");
                    return Ok(());
                };
                let Some(record) = Record::validate(collection, &raw) else {
                    warn!(%uri, "schema validation failed; event dropped");
                    return Ok(());
                };
                if self.sink.is_locally_pending(&uri)? {
                    // The event still counts as observed for the cursor.
                    debug!(%uri, "local pending wins; remote value discarded");
                    return Ok(());
                }
                let board = self.sink.upsert(RecordEvent {
                    uri: uri.clone(),
                    record,
                    time_us: frame.time_us,
                })?;
                if let Some(board) = board {
                    debug!(%uri, %board, "record upserted");
                }
            }
        }
        Ok(())
    }

    fn observe(&mut self, time_us: u64) {
        if self.cursor.map_or(true, |c| time_us > c) {
            self.cursor = Some(time_us);
            self.cursor_dirty = true;
        }
    }

    /// Persist the cursor if it moved since the last save. Persistence is
    /// interval-based rather than per-event to bound write amplification.
    fn persist_cursor(&mut self) {
        if !self.cursor_dirty {
            return;
        }
        let Some(cursor) = self.cursor else { return };
        match self.cursors.save(cursor) {
            Ok(()) => {
                self.cursor_dirty = false;
                trace!(cursor, "cursor persisted");
            }
            Err(e) => warn!(error = %e, "failed to persist cursor"),
        }
    }
}
