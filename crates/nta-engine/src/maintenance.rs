//! Background maintenance loops.
//!
//! Each loop owns one timer and calls into a component through its own
//! lock; none of them share state with each other. All loops exit when the
//! shutdown signal flips.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use nta_detect::{KillChainTracker, LateralMovementTracker};
use nta_intel::IntelService;

const CHAIN_EVICTION_INTERVAL: Duration = Duration::from_secs(3600);
const CHAIN_MAX_AGE: Duration = Duration::from_secs(24 * 3600);

/// Evict stale lateral-movement state on a fixed cadence.
pub async fn run_tracker_cleanup(
    tracker: Arc<LateralMovementTracker>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("tracker cleanup stopped");
                    return;
                }
            }
            _ = tick.tick() => {
                tracker.cleanup();
                debug!(entries = tracker.tracked_entries(), "tracker cleanup pass");
            }
        }
    }
}

/// Sweep expired intel-cache entries on a fixed cadence.
pub async fn run_cache_sweep(
    intel: Arc<IntelService>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("cache sweep stopped");
                    return;
                }
            }
            _ = tick.tick() => {
                let removed = intel.sweep_cache();
                if removed > 0 {
                    debug!(removed, "swept expired intel cache entries");
                }
            }
        }
    }
}

/// Evict kill-chain entities idle longer than a day, hourly.
pub async fn run_chain_eviction(
    killchain: Arc<KillChainTracker>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(CHAIN_EVICTION_INTERVAL);
    tick.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("kill-chain eviction stopped");
                    return;
                }
            }
            _ = tick.tick() => {
                killchain.clean_old_chains(CHAIN_MAX_AGE);
                debug!(entities = killchain.tracked_entities(), "kill-chain eviction pass");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loops_exit_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let tracker = Arc::new(LateralMovementTracker::new(&Default::default()));
        let chains = Arc::new(KillChainTracker::new());

        let h1 = tokio::spawn(run_tracker_cleanup(
            tracker,
            Duration::from_secs(30),
            rx.clone(),
        ));
        let h2 = tokio::spawn(run_chain_eviction(chains, rx));

        tx.send(true).unwrap();
        h1.await.unwrap();
        h2.await.unwrap();
    }
}
