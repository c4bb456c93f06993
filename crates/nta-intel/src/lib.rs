//! NTA Threat Intelligence
//!
//! Resolves indicators (IP/domain/hash/URL) to verdicts through a
//! three-tier pipeline: in-memory TTL cache, persistent storage, then a
//! prioritized list of external sources. Confirmed verdicts are written
//! back to storage and cache; confirmed-clean lookups are cached as a
//! synthetic benign indicator so external sources are not re-queried
//! within the TTL. A feed synchronizer independently bulk-pulls source
//! feeds into the storage tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nta_common::Severity;

pub mod cache;
pub mod label;
pub mod service;
pub mod sources;
pub mod store;
pub mod sync;

pub use cache::IntelCache;
pub use service::IntelService;
pub use sources::{IntelSource, OtxSource, ThreatFoxSource};
pub use store::{IntelStore, MemIntelStore, UpsertOutcome};
pub use sync::{FeedSyncer, SyncReport};

/// Indicator classification exposed to lookup callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorType {
    Ip,
    Domain,
    Hash,
    Url,
}

impl IndicatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorType::Ip => "ip",
            IndicatorType::Domain => "domain",
            IndicatorType::Hash => "hash",
            IndicatorType::Url => "url",
        }
    }

    /// Classify a source's native type tag by substring, defaulting to `Ip`.
    pub fn from_source_tag(tag: &str) -> IndicatorType {
        let tag = tag.to_ascii_lowercase();
        if tag.contains("domain") || tag.contains("hostname") {
            IndicatorType::Domain
        } else if tag.contains("url") {
            IndicatorType::Url
        } else if tag.contains("hash") || tag.contains("md5") || tag.contains("sha") {
            IndicatorType::Hash
        } else {
            IndicatorType::Ip
        }
    }
}

/// A known-good/known-bad classification record for an indicator value.
///
/// Uniquely identified by (type, value, source) in storage; the (type, value)
/// composite across all sources is the lookup key exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(rename = "type")]
    pub indicator_type: IndicatorType,
    pub value: String,
    pub severity: Severity,
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub threat_label: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl Indicator {
    /// Synthetic benign verdict for a value no source flagged. Cached to
    /// suppress repeated external calls, never persisted.
    pub fn benign(indicator_type: IndicatorType, value: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            indicator_type,
            value: value.into(),
            severity: Severity::None,
            source: "local".to_string(),
            description: String::new(),
            tags: Vec::new(),
            threat_label: String::new(),
            first_seen: now,
            last_seen: now,
            valid_until: None,
        }
    }

    pub fn is_benign(&self) -> bool {
        self.severity == Severity::None
    }

    /// Cache/lookup key: `"type:value"`.
    pub fn lookup_key(indicator_type: IndicatorType, value: &str) -> String {
        format!("{}:{}", indicator_type.as_str(), value)
    }
}

/// Errors raised by the intelligence tier.
#[derive(Error, Debug)]
pub enum IntelError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("source returned status: {0}")]
    SourceStatus(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for IntelError {
    fn from(e: reqwest::Error) -> Self {
        IntelError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tag_classification() {
        assert_eq!(IndicatorType::from_source_tag("domain"), IndicatorType::Domain);
        assert_eq!(IndicatorType::from_source_tag("url"), IndicatorType::Url);
        assert_eq!(IndicatorType::from_source_tag("sha256_hash"), IndicatorType::Hash);
        assert_eq!(IndicatorType::from_source_tag("md5_hash"), IndicatorType::Hash);
        assert_eq!(IndicatorType::from_source_tag("ip:port"), IndicatorType::Ip);
        assert_eq!(IndicatorType::from_source_tag("something-else"), IndicatorType::Ip);
    }

    #[test]
    fn benign_indicator_shape() {
        let ind = Indicator::benign(IndicatorType::Ip, "198.51.100.7");
        assert!(ind.is_benign());
        assert_eq!(ind.source, "local");
        assert_eq!(
            Indicator::lookup_key(ind.indicator_type, &ind.value),
            "ip:198.51.100.7"
        );
    }
}
