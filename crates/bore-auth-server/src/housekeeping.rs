//! Background maintenance.
//!
//! One task refreshes the route cache and sweeps stale login attempts on a
//! fixed period. The first tick fires immediately so the cache is warm
//! shortly after startup.

use std::sync::Arc;
use std::time::Duration;

use bore_auth_oauth::PkceTracker;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::routes_cache::{RefreshOutcome, RoutePolicyCache};

/// Spawns the maintenance loop.
pub struct Housekeeping;

impl Housekeeping {
    /// Start the loop on the current runtime.
    pub fn spawn(
        routes: Arc<RoutePolicyCache>,
        tracker: Arc<PkceTracker>,
        period: Duration,
    ) -> HousekeepingHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Housekeeping cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_once(&routes, &tracker).await;
                    }
                }
            }
        });

        info!(period_secs = period.as_secs(), "Started housekeeping");
        HousekeepingHandle { cancel, handle }
    }
}

/// One maintenance pass.
async fn run_once(routes: &RoutePolicyCache, tracker: &PkceTracker) {
    if routes.refresh().await == RefreshOutcome::Failed {
        warn!("Periodic route refresh failed");
    }

    let swept = tracker.sweep();
    if swept > 0 {
        debug!(swept, "Swept stale login attempts");
    }
}

/// Handle to the running maintenance task.
pub struct HousekeepingHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HousekeepingHandle {
    /// Whether the task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Housekeeping task ended abnormally");
        }
    }
}
