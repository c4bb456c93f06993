//! Persistent indicator storage seam.
//!
//! The relational backend lives outside this core; the engine talks to it
//! through `IntelStore`. `MemIntelStore` backs tests and default wiring.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{Indicator, IndicatorType, IntelError};

/// Outcome of an upsert by (type, value, source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Storage tier consulted between the cache and external sources.
#[async_trait]
pub trait IntelStore: Send + Sync {
    /// First indicator matching (type, value) across all sources.
    async fn find(
        &self,
        indicator_type: IndicatorType,
        value: &str,
    ) -> Result<Option<Indicator>, IntelError>;

    /// Exact match on the (type, value, source) identity.
    async fn find_exact(
        &self,
        indicator_type: IndicatorType,
        value: &str,
        source: &str,
    ) -> Result<Option<Indicator>, IntelError>;

    /// Insert if absent, field-level update if present, keyed by
    /// (type, value, source).
    async fn upsert(&self, indicator: Indicator) -> Result<UpsertOutcome, IntelError>;
}

/// In-memory store keyed by the (type, value) lookup key, holding one row
/// per source.
#[derive(Default)]
pub struct MemIntelStore {
    rows: DashMap<String, Vec<Indicator>>,
}

impl MemIntelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows across all keys (test observability).
    pub fn row_count(&self) -> usize {
        self.rows.iter().map(|kv| kv.value().len()).sum()
    }
}

#[async_trait]
impl IntelStore for MemIntelStore {
    async fn find(
        &self,
        indicator_type: IndicatorType,
        value: &str,
    ) -> Result<Option<Indicator>, IntelError> {
        let key = Indicator::lookup_key(indicator_type, value);
        Ok(self
            .rows
            .get(&key)
            .and_then(|rows| rows.first().cloned()))
    }

    async fn find_exact(
        &self,
        indicator_type: IndicatorType,
        value: &str,
        source: &str,
    ) -> Result<Option<Indicator>, IntelError> {
        let key = Indicator::lookup_key(indicator_type, value);
        Ok(self.rows.get(&key).and_then(|rows| {
            rows.iter().find(|r| r.source == source).cloned()
        }))
    }

    async fn upsert(&self, indicator: Indicator) -> Result<UpsertOutcome, IntelError> {
        let key = Indicator::lookup_key(indicator.indicator_type, &indicator.value);
        let mut rows = self.rows.entry(key).or_default();
        if let Some(existing) = rows.iter_mut().find(|r| r.source == indicator.source) {
            // Field-level update; first_seen is preserved from the
            // original row.
            existing.severity = indicator.severity;
            existing.description = indicator.description;
            existing.tags = indicator.tags;
            existing.threat_label = indicator.threat_label;
            existing.last_seen = indicator.last_seen;
            existing.valid_until = indicator.valid_until;
            Ok(UpsertOutcome::Updated)
        } else {
            rows.push(indicator);
            Ok(UpsertOutcome::Inserted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nta_common::Severity;

    fn flagged(value: &str, source: &str, severity: Severity) -> Indicator {
        let mut ind = Indicator::benign(IndicatorType::Ip, value);
        ind.source = source.to_string();
        ind.severity = severity;
        ind
    }

    #[tokio::test]
    async fn upsert_inserts_then_updates() {
        let store = MemIntelStore::new();
        let outcome = store
            .upsert(flagged("203.0.113.9", "threatfox", Severity::Medium))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let outcome = store
            .upsert(flagged("203.0.113.9", "threatfox", Severity::High))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(store.row_count(), 1);

        let row = store
            .find(IndicatorType::Ip, "203.0.113.9")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.severity, Severity::High);
    }

    #[tokio::test]
    async fn sources_keep_separate_rows() {
        let store = MemIntelStore::new();
        store
            .upsert(flagged("203.0.113.9", "threatfox", Severity::High))
            .await
            .unwrap();
        store
            .upsert(flagged("203.0.113.9", "otx", Severity::Medium))
            .await
            .unwrap();
        assert_eq!(store.row_count(), 2);

        let exact = store
            .find_exact(IndicatorType::Ip, "203.0.113.9", "otx")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exact.severity, Severity::Medium);
    }
}
