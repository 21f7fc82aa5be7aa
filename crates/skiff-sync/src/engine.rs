//! The reconciliation engine.
//!
//! Runs a push cycle on a fixed interval (and immediately on startup and on
//! network-up): every locally owned `pending` record is written to the
//! author's own repository, with failures classified transient (stays
//! pending) or permanent (marked `error`, reset to `pending` before the
//! next cycle). Full pulls are on-demand - initial board load or explicit
//! refresh - and apply local-pending-wins so an in-flight edit is never
//! clobbered by its own stale remote echo.
//!
//! Every remote call is bounded by a request timeout and isolated: one
//! record's failure never blocks the rest of the cycle.

use crate::error::{Error, Result};
use crate::repo::{RepoClient, RepoError};
use crate::store::{board_of, LocalStore, UpsertOutcome};
use futures::stream::{self, StreamExt};
use skiff_types::{Collection, Did, Record, RecordUri, Stored, SyncStatus};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Push cycle interval
    pub interval: Duration,
    /// Bound on any single remote call
    pub request_timeout: Duration,
    /// Maximum remote calls in flight during a fan-out
    pub max_in_flight: usize,
    /// Collections reconciled during pulls
    pub collections: Vec<Collection>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_in_flight: 3,
            collections: Collection::ALL.to_vec(),
        }
    }
}

/// Outcome counts of one push cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushStats {
    /// Confirmed written and flipped to `synced`
    pub pushed: usize,
    /// Transient failures; left `pending` for the next cycle
    pub retried: usize,
    /// Permanent rejections; marked `error`
    pub errored: usize,
}

/// Outcome counts of one pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullStats {
    /// Rows inserted or updated from remote content
    pub applied: usize,
    /// Rows skipped because a local pending write holds the key
    pub skipped_pending: usize,
    /// Rows skipped because remote content was byte-identical
    pub unchanged: usize,
    /// Raw records dropped by schema validation or board filtering
    pub dropped: usize,
}

impl PullStats {
    fn merge(&mut self, other: PullStats) {
        self.applied += other.applied;
        self.skipped_pending += other.skipped_pending;
        self.unchanged += other.unchanged;
        self.dropped += other.dropped;
    }
}

enum PushOutcome {
    Pushed,
    Retried,
    Errored,
}

/// Handle for stopping a running engine from outside.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SyncHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Bidirectional reconciler between a local store and remote repositories.
pub struct SyncEngine<S, R> {
    config: SyncConfig,
    store: S,
    repo: R,
    /// The identity whose records this replica owns and pushes
    self_did: Did,
    online: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
}

impl<S, R> SyncEngine<S, R>
where
    S: LocalStore,
    R: RepoClient,
{
    /// Build an engine and its shutdown handle.
    pub fn new(
        config: SyncConfig,
        store: S,
        repo: R,
        self_did: Did,
        online: watch::Receiver<bool>,
    ) -> (Self, SyncHandle) {
        let (shutdown_tx, shutdown) = watch::channel(false);
        (
            Self {
                config,
                store,
                repo,
                self_did,
                online,
                shutdown,
            },
            SyncHandle { shutdown_tx },
        )
    }

    /// Run push cycles until shutdown: immediately on startup, then on the
    /// configured interval, plus an extra cycle on every network-up edge.
    /// A failed cycle is logged and retried on the next tick; the loop
    /// itself never dies.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                res = self.online.changed() => {
                    if res.is_err() {
                        warn!("network signal source dropped; stopping");
                        break;
                    }
                    if *self.online.borrow() {
                        info!("network up; running immediate push cycle");
                        self.run_cycle().await;
                    }
                }
                _ = self.shutdown.changed() => break,
            }
        }

        info!("reconciliation engine stopped");
        Ok(())
    }

    async fn run_cycle(&self) {
        match self.push_cycle().await {
            Ok(stats) => trace!(?stats, "push cycle finished"),
            Err(e) => warn!(error = %e, "push cycle failed; retrying next tick"),
        }
    }

    /// Push every locally owned `pending` record to the remote repository.
    ///
    /// Records previously marked `error` are reset to `pending` first, so
    /// permanent-looking failures get another chance each cycle. Skipped
    /// entirely while offline.
    pub async fn push_cycle(&self) -> Result<PushStats> {
        if !*self.online.borrow() {
            debug!("offline; skipping push cycle");
            return Ok(PushStats::default());
        }

        self.store.reset_errors(&self.self_did)?;
        let pending = self.store.list_pending(&self.self_did)?;
        if pending.is_empty() {
            return Ok(PushStats::default());
        }
        debug!(count = pending.len(), "pushing pending records");

        let outcomes: Vec<PushOutcome> = stream::iter(pending)
            .map(|record| self.push_one(record))
            .buffer_unordered(self.config.max_in_flight)
            .collect()
            .await;

        let mut stats = PushStats::default();
        for outcome in outcomes {
            match outcome {
                PushOutcome::Pushed => stats.pushed += 1,
                PushOutcome::Retried => stats.retried += 1,
                PushOutcome::Errored => stats.errored += 1,
            }
        }
        Ok(stats)
    }

    /// Push one record; failures are contained to this record.
    async fn push_one(&self, record: Stored<Record>) -> PushOutcome {
        let uri = record.uri.clone();
        let call = self
            .repo
            .put_record(&uri.did, uri.collection, &uri.rkey, &record.value);

        let result = match timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RepoError::Timeout),
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.store.set_status(&uri, SyncStatus::Synced) {
                    warn!(%uri, error = %e, "pushed but failed to mark synced");
                    return PushOutcome::Retried;
                }
                trace!(%uri, "pushed");
                PushOutcome::Pushed
            }
            Err(e) if e.is_transient() => {
                debug!(%uri, error = %e, "transient push failure; will retry");
                PushOutcome::Retried
            }
            Err(e) => {
                warn!(%uri, error = %e, "push rejected; marking error");
                if let Err(e) = self.store.set_status(&uri, SyncStatus::Error) {
                    warn!(%uri, error = %e, "failed to mark error");
                }
                PushOutcome::Errored
            }
        }
    }

    /// Full reconciliation of one board: list every known participant's
    /// repository across the watched collections and upsert into the local
    /// store with local-pending-wins. Used on initial board load and
    /// explicit refresh rather than every tick.
    pub async fn pull_board(&self, board: &RecordUri) -> Result<PullStats> {
        let mut dids = self.store.participants(board)?;
        if !dids.contains(&board.did) {
            // The board owner's repository always participates.
            dids.push(board.did.clone());
        }

        let units: Vec<(Did, Collection)> = dids
            .into_iter()
            .flat_map(|did| {
                self.config
                    .collections
                    .iter()
                    .map(move |c| (did.clone(), *c))
            })
            .collect();

        let partials: Vec<PullStats> = stream::iter(units)
            .map(|(did, collection)| self.pull_unit(board, did, collection))
            .buffer_unordered(self.config.max_in_flight)
            .collect()
            .await;

        let mut stats = PullStats::default();
        for partial in partials {
            stats.merge(partial);
        }
        debug!(%board, ?stats, "pull finished");
        Ok(stats)
    }

    /// Pull one (repository, collection) pair. Remote failures are logged
    /// and yield empty stats; they never abort the rest of the pull.
    async fn pull_unit(&self, board: &RecordUri, did: Did, collection: Collection) -> PullStats {
        let mut stats = PullStats::default();
        let mut cursor: Option<String> = None;

        loop {
            let call = self.repo.list_records(&did, collection, cursor.clone());
            let page = match timeout(self.config.request_timeout, call).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!(%did, %collection, error = %e, "list_records failed; skipping");
                    return stats;
                }
                Err(_) => {
                    warn!(%did, %collection, "list_records timed out; skipping");
                    return stats;
                }
            };

            for (uri, raw) in page.records {
                let Some(record) = Record::validate(collection, &raw) else {
                    trace!(%uri, "invalid remote record; skipped");
                    stats.dropped += 1;
                    continue;
                };
                if &board_of(&uri, &record) != board {
                    stats.dropped += 1;
                    continue;
                }
                if let Err(e) = self.store.note_participant(&uri.did, board) {
                    warn!(%uri, error = %e, "failed to note participant");
                }
                match self.store.upsert_remote(uri, record) {
                    Ok(UpsertOutcome::Inserted) | Ok(UpsertOutcome::Updated) => stats.applied += 1,
                    Ok(UpsertOutcome::Unchanged) => stats.unchanged += 1,
                    Ok(UpsertOutcome::SkippedPending) => stats.skipped_pending += 1,
                    Err(e) => warn!(error = %e, "local upsert failed"),
                }
            }

            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }

        stats
    }

    /// Two-phase delete of an owned record: remove it from the remote
    /// repository first (if it was ever synced), then drop the local row,
    /// so concurrent readers observe the delete through ingestion.
    pub async fn delete_record(&self, uri: &RecordUri) -> Result<()> {
        let Some(existing) = self.store.get(uri)? else {
            return Ok(());
        };

        if existing.status != SyncStatus::Pending {
            // A still-pending record has nothing to delete remotely.
            let call = self.repo.delete_record(&uri.did, uri.collection, &uri.rkey);
            let result = match timeout(self.config.request_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(RepoError::Timeout),
            };
            match result {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    debug!(%uri, error = %e, "remote delete failed transiently; keeping row");
                    return Err(Error::Repo(e));
                }
                Err(e) => {
                    // The server will never accept this delete; keeping the
                    // local row forever serves nobody.
                    warn!(%uri, error = %e, "remote delete rejected; removing locally anyway");
                }
            }
        }

        self.store.remove(uri)?;
        debug!(%uri, "record deleted");
        Ok(())
    }
}
