//! Event persistence seam.
//!
//! Alerts and raw records go to a store the engine treats as best-effort:
//! a write failure is logged by the caller and never blocks the record
//! path. The relational backend lives outside this core; `MemEventStore`
//! backs tests and default wiring.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use nta_common::{Alert, EngineResult, Record};

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save_alert(&self, alert: &Alert) -> EngineResult<()>;
    async fn save_record(&self, record: &Record) -> EngineResult<()>;
}

/// In-memory event store.
#[derive(Default)]
pub struct MemEventStore {
    alerts: DashMap<Uuid, Alert>,
    records: Mutex<Vec<Record>>,
}

impl MemEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    /// Stored alerts of the given type (test observability).
    pub fn alerts_of_type(&self, alert_type: &str) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|kv| kv.value().alert_type == alert_type)
            .map(|kv| kv.value().clone())
            .collect()
    }
}

#[async_trait]
impl EventStore for MemEventStore {
    async fn save_alert(&self, alert: &Alert) -> EngineResult<()> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn save_record(&self, record: &Record) -> EngineResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Store that rejects every write (failure-path tests).
#[cfg(test)]
pub(crate) struct FailingEventStore;

#[cfg(test)]
#[async_trait]
impl EventStore for FailingEventStore {
    async fn save_alert(&self, _alert: &Alert) -> EngineResult<()> {
        Err(nta_common::EngineError::Storage("write refused".to_string()))
    }

    async fn save_record(&self, _record: &Record) -> EngineResult<()> {
        Err(nta_common::EngineError::Storage("write refused".to_string()))
    }
}
