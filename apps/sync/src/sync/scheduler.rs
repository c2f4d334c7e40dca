//! Run invocation: single-flight guard and the fixed-interval timer.
//!
//! Exclusion is process-local. Deployments that start several processes must
//! still make sure only one of them triggers runs.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::sync::orchestrator::{SyncError, SyncReport, SyncService};

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Shared handle that lets at most one pass run at a time. A trigger that
/// arrives while a pass is running is rejected, not queued.
#[derive(Clone)]
pub struct SingleFlight {
    service: Arc<SyncService>,
    lock: Arc<Mutex<()>>,
}

impl SingleFlight {
    pub fn new(service: Arc<SyncService>) -> Self {
        Self {
            service,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    pub async fn trigger(&self) -> Result<SyncReport, TriggerError> {
        let _guard = self
            .lock
            .try_lock()
            .map_err(|_| TriggerError::AlreadyRunning)?;
        Ok(self.service.run().await?)
    }
}

/// Runs a pass immediately, then once per `every`. Failures are logged and the
/// loop carries on. A pass that overruns its slot delays the next tick instead
/// of bursting.
pub async fn run_on_interval(runner: SingleFlight, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        info!("scheduled sync triggered");

        match runner.trigger().await {
            Ok(report) => info!(
                synced = report.records_synced,
                changed = report.records_changed,
                "scheduled sync complete"
            ),
            Err(TriggerError::AlreadyRunning) => {
                warn!("previous sync still running, skipping this tick")
            }
            Err(e) => error!(error = %e, "scheduled sync failed, will retry next interval"),
        }

        info!(next_in_secs = every.as_secs(), "next sync scheduled");
    }
}
