//! Security alerts emitted by the detection engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert severity scale. `None` is reserved for benign intel verdicts and
/// never appears on a persisted alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse a wire severity string; unknown values map to `Low`.
    pub fn parse(s: &str) -> Severity {
        match s {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "none" => Severity::None,
            _ => Severity::Low,
        }
    }
}

/// Alert lifecycle status. The engine only ever writes `New`; the rest of
/// the lifecycle is driven by the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Investigating,
    Resolved,
    FalsePositive,
}

/// A security alert produced by a detector.
///
/// Invariant: `confidence` is strictly in (0, 1]. A detector that has no
/// finding returns `None` rather than an alert with confidence 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Machine-readable detection tag, e.g. `lateral_scan`, `pass_the_hash`.
    pub alert_type: String,
    #[serde(default)]
    pub src_ip: String,
    #[serde(default)]
    pub dst_ip: String,
    pub description: String,
    pub confidence: f64,
    /// Human-readable threat category, set on intel matches.
    #[serde(default)]
    pub threat_label: String,
    /// Intel source that produced the verdict, set on intel matches.
    #[serde(default)]
    pub threat_source: String,
    pub status: AlertStatus,
}

impl Alert {
    /// Build a new alert with the invariant checked in debug builds.
    pub fn new(
        alert_type: impl Into<String>,
        severity: Severity,
        confidence: f64,
        description: impl Into<String>,
    ) -> Self {
        debug_assert!(
            confidence > 0.0 && confidence <= 1.0,
            "alert confidence out of (0, 1]"
        );
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            alert_type: alert_type.into(),
            src_ip: String::new(),
            dst_ip: String::new(),
            description: description.into(),
            confidence,
            threat_label: String::new(),
            threat_source: String::new(),
            status: AlertStatus::New,
        }
    }

    pub fn with_endpoints(mut self, src_ip: impl Into<String>, dst_ip: impl Into<String>) -> Self {
        self.src_ip = src_ip.into();
        self.dst_ip = dst_ip.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_roundtrip() {
        assert_eq!(Severity::parse("critical"), Severity::Critical);
        assert_eq!(Severity::parse("none"), Severity::None);
        assert_eq!(Severity::High.as_str(), "high");
        let json = serde_json::to_string(&Severity::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low > Severity::None);
    }

    #[test]
    fn alert_builder_sets_endpoints() {
        let alert = Alert::new("lateral_scan", Severity::High, 0.9, "scan")
            .with_endpoints("10.0.0.1", "10.0.0.2");
        assert_eq!(alert.src_ip, "10.0.0.1");
        assert_eq!(alert.status, AlertStatus::New);
    }
}
