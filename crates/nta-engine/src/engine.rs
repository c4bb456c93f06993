//! Engine assembly.
//!
//! Wires configuration, intel sources, trackers, and the dispatcher into a
//! running set of consumer workers plus maintenance loops. Callers supply
//! the bus subscriptions and the storage backends; everything in between
//! is built here.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use nta_common::{EngineConfig, EngineError, EngineResult};
use nta_detect::{KillChainTracker, LateralMovementTracker};
use nta_intel::sources::source_from_config;
use nta_intel::{FeedSyncer, IntelService, IntelSource, IntelStore};

use crate::consumer::{ConsumerWorker, RecordBus, StatsSnapshot, WorkerStats};
use crate::dispatcher::Dispatcher;
use crate::maintenance;
use crate::storage::EventStore;

pub struct Engine {
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    intel: Arc<IntelService>,
    lateral: Arc<LateralMovementTracker>,
    killchain: Arc<KillChainTracker>,
    syncer: Arc<FeedSyncer>,
    worker_stats: parking_lot::Mutex<Vec<Arc<WorkerStats>>>,
}

impl Engine {
    /// Build the full detection pipeline from configuration. Fails when
    /// the configuration is internally inconsistent.
    pub fn new(
        config: EngineConfig,
        intel_store: Arc<dyn IntelStore>,
        event_store: Arc<dyn EventStore>,
    ) -> EngineResult<Self> {
        validate(&config)?;

        let sources: Vec<Arc<dyn IntelSource>> = config
            .intel
            .sources
            .iter()
            .filter(|s| s.enabled)
            .map(source_from_config)
            .collect();

        let intel = Arc::new(IntelService::new(
            intel_store.clone(),
            sources.clone(),
            Duration::from_secs(config.intel.cache_ttl_secs),
        ));
        let lateral = Arc::new(LateralMovementTracker::new(&config.detection));
        let killchain = Arc::new(KillChainTracker::new());
        let dispatcher = Arc::new(Dispatcher::new(
            intel.clone(),
            lateral.clone(),
            killchain.clone(),
            event_store,
            &config.detection,
        ));
        let syncer = Arc::new(FeedSyncer::new(
            intel_store,
            sources,
            config.intel.sync_hour,
            config.intel.sync_max_rows,
        ));

        Ok(Self {
            config,
            dispatcher,
            intel,
            lateral,
            killchain,
            syncer,
            worker_stats: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Spawn one consumer worker per bus subscription plus the maintenance
    /// loops, then wait for all of them to stop. Returns once the shutdown
    /// signal flips.
    pub async fn run(&self, buses: Vec<Arc<dyn RecordBus>>, shutdown: watch::Receiver<bool>) {
        info!(workers = buses.len(), "starting detection engine");
        let mut handles = Vec::new();

        for bus in buses {
            let worker = ConsumerWorker::new(bus, self.dispatcher.clone());
            self.worker_stats.lock().push(worker.stats());
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move { worker.run(rx).await }));
        }

        handles.push(tokio::spawn(maintenance::run_tracker_cleanup(
            self.lateral.clone(),
            Duration::from_secs(self.config.detection.cleanup_interval_secs),
            shutdown.clone(),
        )));
        handles.push(tokio::spawn(maintenance::run_cache_sweep(
            self.intel.clone(),
            Duration::from_secs(self.config.intel.cache_sweep_secs),
            shutdown.clone(),
        )));
        handles.push(tokio::spawn(maintenance::run_chain_eviction(
            self.killchain.clone(),
            shutdown.clone(),
        )));

        {
            let syncer = self.syncer.clone();
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move { syncer.run(rx).await }));
        }

        for handle in handles {
            // A panicked task is a bug; surface it instead of hanging the
            // shutdown path.
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "engine task failed");
            }
        }
        info!("detection engine stopped");
    }

    /// Aggregate counters across all spawned workers.
    pub fn stats(&self) -> StatsSnapshot {
        let mut total = StatsSnapshot {
            records_processed: 0,
            decode_failures: 0,
            alerts_emitted: 0,
        };
        for stats in self.worker_stats.lock().iter() {
            let s = stats.snapshot();
            total.records_processed += s.records_processed;
            total.decode_failures += s.decode_failures;
            total.alerts_emitted += s.alerts_emitted;
        }
        total
    }
}

fn validate(config: &EngineConfig) -> EngineResult<()> {
    if config.detection.scan_threshold == 0 {
        return Err(EngineError::Config("scan_threshold must be positive".to_string()));
    }
    if config.detection.pth_threshold == 0 {
        return Err(EngineError::Config("pth_threshold must be positive".to_string()));
    }
    if config.intel.sync_hour > 23 {
        return Err(EngineError::Config(format!(
            "sync_hour {} out of range",
            config.intel.sync_hour
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::MemBus;
    use crate::storage::MemEventStore;
    use nta_intel::MemIntelStore;

    fn engine() -> (Engine, Arc<MemEventStore>) {
        let mut config = EngineConfig::default();
        // No live sources in tests.
        config.intel.sources.clear();
        let events = Arc::new(MemEventStore::new());
        let engine = Engine::new(config, Arc::new(MemIntelStore::new()), events.clone()).unwrap();
        (engine, events)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.intel.sync_hour = 24;
        let result = Engine::new(
            config,
            Arc::new(MemIntelStore::new()),
            Arc::new(MemEventStore::new()),
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn engine_processes_until_shutdown() {
        let (engine, events) = engine();
        let bus = Arc::new(MemBus::new());
        bus.push(
            "zeek-dns",
            br#"{"src_ip": "10.0.0.5", "query": "x7k9q2m4p8w3z5v1b6.net"}"#,
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let run = engine.run(vec![bus.clone() as Arc<dyn RecordBus>], stop_rx);
        tokio::pin!(run);

        loop {
            tokio::select! {
                _ = &mut run => break,
                _ = tokio::time::sleep(Duration::from_millis(10)) => {
                    if bus.committed() >= 1 {
                        stop_tx.send(true).unwrap();
                    }
                }
            }
        }

        assert_eq!(events.record_count(), 1);
        assert_eq!(events.alerts_of_type("dga_domain").len(), 1);
        let stats = engine.stats();
        assert_eq!(stats.records_processed, 1);
        assert_eq!(stats.alerts_emitted, 1);
    }
}
