//! Appview process wiring.
//!
//! Composes the pieces the rest of the crate provides: opens the canonical
//! store, hooks the firehose client up to the [`AppviewSink`], and serves
//! the board API. The transport is injected by the caller; everything else
//! comes from [`AppviewConfig`].

use crate::config::AppviewConfig;
use crate::error::Result;
use crate::notify::BoardNotifier;
use crate::server::{build_router, serve, AppState};
use crate::sink::AppviewSink;
use crate::store::CanonicalStore;
use axum::Router;
use skiff_ingest::{IngestClient, IngestConfig, IngestHandle, Resume, Transport};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// A fully wired appview: canonical store, board notifier, API router.
pub struct AppviewNode {
    config: AppviewConfig,
    store: Arc<CanonicalStore>,
    notifier: BoardNotifier,
}

impl AppviewNode {
    /// Open the canonical store and prepare the shared state.
    pub fn new(config: AppviewConfig) -> Result<Self> {
        let store = Arc::new(CanonicalStore::open(&config.data_dir)?);
        Ok(Self {
            config,
            store,
            notifier: BoardNotifier::new(),
        })
    }

    pub fn store(&self) -> Arc<CanonicalStore> {
        Arc::clone(&self.store)
    }

    /// The API router over this node's store and notifier.
    pub fn router(&self) -> Router {
        build_router(AppState {
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
        })
    }

    /// Build the ingestion client feeding this node's store, resuming from
    /// the persisted cursor. A `Backfill` resume is logged; the appview
    /// indexes forward from the live tail in that case.
    pub fn ingest<T: Transport>(
        &self,
        transport: T,
        online: watch::Receiver<bool>,
    ) -> Result<(
        IngestClient<T, AppviewSink, Arc<CanonicalStore>>,
        IngestHandle,
    )> {
        let sink = AppviewSink::new(Arc::clone(&self.store), self.notifier.clone());
        let (mut client, handle) = IngestClient::new(
            IngestConfig::default(),
            transport,
            sink,
            Arc::clone(&self.store),
            online,
        );
        match client.prepare()? {
            Resume::FromCursor(cursor) => info!(cursor, "resuming from persisted cursor"),
            Resume::Backfill => {
                warn!("no usable cursor; indexing forward from the live tail")
            }
        }
        Ok((client, handle))
    }

    /// Run ingestion and the API server until either stops.
    pub async fn run<T: Transport>(
        self,
        transport: T,
        online: watch::Receiver<bool>,
    ) -> Result<()> {
        crate::telemetry::init();
        let addr = self.config.api_addr;
        let router = self.router();
        let (client, handle) = self.ingest(transport, online)?;
        let _handle = handle;

        tokio::select! {
            res = client.run() => {
                info!("ingestion stopped");
                res?;
            }
            res = serve(addr, router) => {
                res?;
            }
        }
        Ok(())
    }
}
