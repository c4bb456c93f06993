//! Engine configuration.
//!
//! The loader that produces these values (file/env) lives outside this core;
//! the engine consumes the resolved struct.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Detection and maintenance tunables for the whole engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub detection: DetectionConfig,
    pub intel: IntelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Distinct destinations before a scan alert fires.
    pub scan_threshold: usize,
    /// Sliding window for scan timestamps, seconds.
    pub scan_window_secs: u64,
    /// Destinations a single credential hash must touch before PTH fires.
    pub pth_threshold: usize,
    /// Baseline outbound byte volume for the exfiltration classifier.
    pub exfil_baseline_bytes: i64,
    /// Tracker entries idle longer than this are evicted.
    pub tracker_stale_secs: u64,
    /// Interval between tracker cleanup passes.
    pub cleanup_interval_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scan_threshold: 20,
            scan_window_secs: 300,
            pth_threshold: 3,
            exfil_baseline_bytes: 1024 * 1024,
            tracker_stale_secs: 3600,
            cleanup_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelConfig {
    /// Verdict cache TTL.
    pub cache_ttl_secs: u64,
    /// Interval between cache sweep passes.
    pub cache_sweep_secs: u64,
    /// UTC hour-of-day at which the daily full feed sync runs.
    pub sync_hour: u32,
    /// Upper bound on additions+updates per source per sync run.
    pub sync_max_rows: usize,
    pub sources: Vec<SourceConfig>,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            cache_sweep_secs: 60,
            sync_hour: 3,
            sync_max_rows: 10_000,
            sources: vec![SourceConfig {
                name: "threatfox".to_string(),
                url: "https://threatfox-api.abuse.ch/api/v1/".to_string(),
                api_key: String::new(),
                kind: SourceKind::BulkSearch,
                enabled: true,
            }],
        }
    }
}

/// External threat-intel source descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    pub kind: SourceKind,
    pub enabled: bool,
}

/// Wire protocol spoken by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// POST-based bulk/search API keyed by an `Auth-Key` header.
    BulkSearch,
    /// GET-based per-indicator REST API keyed by an `X-OTX-API-KEY` header.
    PulseRest,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            intel: IntelConfig::default(),
        }
    }
}

impl DetectionConfig {
    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(self.scan_window_secs)
    }

    pub fn tracker_staleness(&self) -> Duration {
        Duration::from_secs(self.tracker_stale_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_tuning() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.detection.scan_threshold, 20);
        assert_eq!(cfg.detection.scan_window_secs, 300);
        assert_eq!(cfg.intel.cache_ttl_secs, 3600);
        assert_eq!(cfg.intel.sync_max_rows, 10_000);
        assert_eq!(cfg.intel.sources.len(), 1);
    }
}
