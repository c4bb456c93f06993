//! Event-bus consumption.
//!
//! One worker task per topic subscription. Each worker loops on fetch,
//! dispatches, then commits. A fetch error is logged and retried after a
//! short backoff; a processing error is logged and the message is still
//! committed, so a poison record is dropped rather than redelivered
//! forever.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use nta_common::{EngineError, EngineResult};

use crate::dispatcher::{Dispatcher, Topic};

/// A raw message as delivered by the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Topic subscription on the event bus. `fetch` and `commit` must be
/// cancel-safe; the worker selects against shutdown while awaiting them.
#[async_trait]
pub trait RecordBus: Send + Sync {
    async fn fetch(&self) -> EngineResult<BusMessage>;
    async fn commit(&self, msg: &BusMessage) -> EngineResult<()>;
}

const FETCH_BACKOFF: Duration = Duration::from_secs(1);

/// Per-worker counters, surfaced via [`StatsSnapshot`].
#[derive(Default)]
pub struct WorkerStats {
    records_processed: AtomicU64,
    decode_failures: AtomicU64,
    alerts_emitted: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub records_processed: u64,
    pub decode_failures: u64,
    pub alerts_emitted: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_processed: self.records_processed.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
        }
    }
}

pub struct ConsumerWorker {
    bus: Arc<dyn RecordBus>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<WorkerStats>,
}

impl ConsumerWorker {
    pub fn new(bus: Arc<dyn RecordBus>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            bus,
            dispatcher,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Consume until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("consumer worker stopped");
                        return;
                    }
                }
                fetched = self.bus.fetch() => {
                    match fetched {
                        Ok(msg) => self.process(&msg).await,
                        Err(e) => {
                            warn!(error = %e, "bus fetch failed, backing off");
                            tokio::time::sleep(FETCH_BACKOFF).await;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch one message, then commit it regardless of the outcome.
    pub async fn process(&self, msg: &BusMessage) {
        match Topic::parse(&msg.topic) {
            Some(topic) => match self.dispatcher.dispatch(topic, &msg.payload).await {
                Ok(emitted) => {
                    self.stats.records_processed.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .alerts_emitted
                        .fetch_add(emitted as u64, Ordering::Relaxed);
                }
                Err(EngineError::Decode { topic, source }) => {
                    self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(topic = %topic, error = %source, "dropping undecodable record");
                }
                Err(e) => {
                    warn!(topic = %msg.topic, error = %e, "record processing failed");
                }
            },
            None => {
                warn!(topic = %msg.topic, "dropping record from unknown topic");
            }
        }

        if let Err(e) = self.bus.commit(msg).await {
            warn!(topic = %msg.topic, error = %e, "commit failed");
        }
    }
}

/// In-memory bus backed by an mpsc channel, for tests and local wiring.
pub struct MemBus {
    tx: tokio::sync::mpsc::UnboundedSender<BusMessage>,
    rx: tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<BusMessage>>,
    committed: AtomicU64,
}

impl MemBus {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            committed: AtomicU64::new(0),
        }
    }

    pub fn push(&self, topic: &str, payload: &[u8]) {
        // Send only fails when the receiver is gone, i.e. the bus itself
        // was dropped.
        let _ = self.tx.send(BusMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }
}

impl Default for MemBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordBus for MemBus {
    async fn fetch(&self) -> EngineResult<BusMessage> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| EngineError::Bus("bus closed".to_string()))
    }

    async fn commit(&self, _msg: &BusMessage) -> EngineResult<()> {
        self.committed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemEventStore;
    use nta_common::EngineConfig;
    use nta_detect::{KillChainTracker, LateralMovementTracker};
    use nta_intel::{IntelService, MemIntelStore};

    fn worker() -> (ConsumerWorker, Arc<MemBus>, Arc<MemEventStore>) {
        let config = EngineConfig::default();
        let events = Arc::new(MemEventStore::new());
        let intel = Arc::new(IntelService::new(
            Arc::new(MemIntelStore::new()),
            Vec::new(),
            Duration::from_secs(3600),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            intel,
            Arc::new(LateralMovementTracker::new(&config.detection)),
            Arc::new(KillChainTracker::new()),
            events.clone(),
            &config.detection,
        ));
        let bus = Arc::new(MemBus::new());
        (
            ConsumerWorker::new(bus.clone(), dispatcher),
            bus,
            events,
        )
    }

    #[tokio::test]
    async fn messages_are_processed_and_committed() {
        let (worker, bus, events) = worker();
        bus.push(
            "zeek-dns",
            br#"{"src_ip": "10.0.0.5", "query": "mail.example.com"}"#,
        );

        let msg = bus.fetch().await.unwrap();
        worker.process(&msg).await;

        assert_eq!(events.record_count(), 1);
        assert_eq!(bus.committed(), 1);
        assert_eq!(worker.stats().snapshot().records_processed, 1);
    }

    #[tokio::test]
    async fn poison_record_is_counted_and_committed() {
        let (worker, bus, events) = worker();
        bus.push("zeek-conn", b"{broken");

        let msg = bus.fetch().await.unwrap();
        worker.process(&msg).await;

        assert_eq!(events.record_count(), 0);
        assert_eq!(bus.committed(), 1);
        let stats = worker.stats().snapshot();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.records_processed, 0);
    }

    #[tokio::test]
    async fn unknown_topic_is_dropped_but_committed() {
        let (worker, bus, events) = worker();
        bus.push("zeek-files", b"{}");

        let msg = bus.fetch().await.unwrap();
        worker.process(&msg).await;

        assert_eq!(events.record_count(), 0);
        assert_eq!(bus.committed(), 1);
    }

    #[tokio::test]
    async fn worker_loop_drains_the_bus_and_stops_on_shutdown() {
        let (worker, bus, events) = worker();
        for i in 0..5 {
            bus.push(
                "zeek-dns",
                format!(r#"{{"src_ip": "10.0.0.5", "query": "h{}.example.com"}}"#, i).as_bytes(),
            );
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = Arc::new(worker);
        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run(stop_rx).await })
        };

        // Drain, then signal shutdown.
        while bus.committed() < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(events.record_count(), 5);
        assert_eq!(worker.stats().snapshot().records_processed, 5);
    }
}
