//! Refresh scheduler: periodically re-admits standby sources.
//!
//! Each sweep claims every `standby` source (most overdue first) and
//! hands the claims to scraper workers over a channel. The scheduler
//! holds no state of its own; the store is the queue.

use crate::db::Db;
use crate::error::Result;
use crate::model::RefreshClaim;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tracing::{info, warn};

/// Configuration for the refresh scheduler.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between sweeps.
    pub interval: std::time::Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(3600),
        }
    }
}

/// The refresh loop: sweep standby sources, dispatch claims to workers.
pub struct RefreshScheduler {
    db: Arc<Db>,
    config: RefreshConfig,
    shutdown: Arc<Notify>,
    tx: mpsc::Sender<RefreshClaim>,
}

impl RefreshScheduler {
    pub fn new(db: Arc<Db>, config: RefreshConfig, tx: mpsc::Sender<RefreshClaim>) -> Self {
        Self {
            db,
            config,
            shutdown: Arc::new(Notify::new()),
            tx,
        }
    }

    /// Handle for signalling the scheduler to shut down.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run the refresh loop until shutdown or until every consumer of
    /// the claim channel is gone.
    pub async fn run(&self) -> Result<()> {
        info!(interval_secs = self.config.interval.as_secs(), "refresh scheduler started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("refresh scheduler shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            match self.sweep().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("claim channel closed, refresh scheduler stopping");
                    return Ok(());
                }
                Err(e) => {
                    // Transient store failures leave state unchanged; the
                    // next sweep retries the same claim safely.
                    warn!("refresh sweep failed: {e}");
                }
            }
        }
    }

    /// Claim every due source and dispatch the claims. Returns false when
    /// the consumer side of the channel has been dropped.
    async fn sweep(&self) -> Result<bool> {
        let claims = self.db.claim_sources_to_refresh().await?;
        if claims.is_empty() {
            return Ok(true);
        }

        info!(count = claims.len(), "dispatching refresh claims");
        for claim in claims {
            if self.tx.send(claim).await.is_err() {
                // Already-claimed rows stay in `refreshing`; there is no
                // automatic recovery for them, so make the loss visible.
                warn!("refresh claim dropped: no consumers remain");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
