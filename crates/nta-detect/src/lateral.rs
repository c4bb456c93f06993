//! Lateral-movement correlation.
//!
//! Tracks three behaviors per source host: destination fan-out (scanning),
//! one credential hash reused against multiple hosts (pass-the-hash), and
//! remote-execution method sequences (PsExec, WMI). All state sits behind
//! a single mutex; every observation both mutates and evaluates.
//!
//! Known quirks kept for parity with deployed tunings: the scan target set
//! only grows until cleanup evicts the whole entry, and pass-the-hash
//! counts total observations rather than distinct destinations.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

use nta_common::{Alert, Connection, DetectionConfig, Severity};

struct ScanEntry {
    targets: HashSet<String>,
    times: Vec<DateTime<Utc>>,
}

struct AuthEntry {
    destinations: Vec<String>,
    last_seen: DateTime<Utc>,
}

struct ExecEntry {
    methods: Vec<String>,
    last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct TrackerState {
    scans: HashMap<String, ScanEntry>,
    auths: HashMap<String, AuthEntry>,
    execs: HashMap<String, ExecEntry>,
}

pub struct LateralMovementTracker {
    state: Mutex<TrackerState>,
    scan_threshold: usize,
    scan_window: ChronoDuration,
    pth_threshold: usize,
    staleness: ChronoDuration,
}

impl LateralMovementTracker {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            scan_threshold: config.scan_threshold,
            scan_window: chrono_duration(config.scan_window()),
            pth_threshold: config.pth_threshold,
            staleness: chrono_duration(config.tracker_staleness()),
        }
    }

    /// Record a connection for scan detection. Fires `lateral_scan` once
    /// the source has touched the threshold of distinct destinations, and
    /// again on every further destination.
    pub fn observe_connection(&self, conn: &Connection) -> Option<Alert> {
        let mut state = self.state.lock();
        let entry = state
            .scans
            .entry(conn.src_ip.clone())
            .or_insert_with(|| ScanEntry {
                targets: HashSet::new(),
                times: Vec::new(),
            });

        entry.targets.insert(conn.dst_ip.clone());
        entry.times.push(conn.timestamp);
        let cutoff = conn.timestamp - self.scan_window;
        entry.times.retain(|t| *t > cutoff);

        if entry.targets.len() >= self.scan_threshold {
            debug!(src = %conn.src_ip, targets = entry.targets.len(), "scan threshold reached");
            return Some(
                Alert::new(
                    "lateral_scan",
                    Severity::High,
                    0.9,
                    format!(
                        "host {} contacted {} distinct destinations within {}s",
                        conn.src_ip,
                        entry.targets.len(),
                        self.scan_window.num_seconds()
                    ),
                )
                .with_endpoints(conn.src_ip.clone(), conn.dst_ip.clone())
                .at(conn.timestamp),
            );
        }
        None
    }

    /// Record a credential use. Fires `pass_the_hash` once the same hash
    /// from the same source has been seen against enough hosts.
    pub fn observe_auth(&self, src: &str, credential_hash: &str, dst: &str) -> Option<Alert> {
        let mut state = self.state.lock();
        let key = format!("{}:{}", src, credential_hash);
        let entry = state.auths.entry(key).or_insert_with(|| AuthEntry {
            destinations: Vec::new(),
            last_seen: Utc::now(),
        });

        entry.destinations.push(dst.to_string());
        entry.last_seen = Utc::now();

        if entry.destinations.len() >= self.pth_threshold {
            return Some(
                Alert::new(
                    "pass_the_hash",
                    Severity::Critical,
                    0.95,
                    format!(
                        "credential hash from {} used against {} hosts",
                        src,
                        entry.destinations.len()
                    ),
                )
                .with_endpoints(src, dst),
            );
        }
        None
    }

    /// Record a remote-execution event. The admin-share/service-control
    /// pair reads as PsExec; a WMI method on its own reads as WMI exec.
    pub fn observe_exec(&self, src: &str, dst: &str, method: &str) -> Option<Alert> {
        let mut state = self.state.lock();
        let key = format!("{}:{}", src, dst);
        let entry = state.execs.entry(key).or_insert_with(|| ExecEntry {
            methods: Vec::new(),
            last_seen: Utc::now(),
        });

        entry.methods.push(method.to_string());
        entry.last_seen = Utc::now();

        let has = |m: &str| entry.methods.iter().any(|e| e == m);
        if has("admin_share") && has("svcctl") {
            return Some(
                Alert::new(
                    "psexec",
                    Severity::Critical,
                    0.92,
                    format!("PsExec-style execution from {} on {}", src, dst),
                )
                .with_endpoints(src, dst),
            );
        }
        if has("wmi_exec") {
            return Some(
                Alert::new(
                    "wmi_exec",
                    Severity::High,
                    0.88,
                    format!("WMI remote execution from {} on {}", src, dst),
                )
                .with_endpoints(src, dst),
            );
        }
        None
    }

    /// Evict entries idle past the staleness bound.
    pub fn cleanup(&self) {
        self.cleanup_at(Utc::now());
    }

    fn cleanup_at(&self, now: DateTime<Utc>) {
        let cutoff = now - self.staleness;
        let mut state = self.state.lock();
        state
            .scans
            .retain(|_, e| matches!(e.times.last(), Some(t) if *t > cutoff));
        state.auths.retain(|_, e| e.last_seen > cutoff);
        state.execs.retain(|_, e| e.last_seen > cutoff);
    }

    /// Tracked entry count across all three maps (for stats snapshots).
    pub fn tracked_entries(&self) -> usize {
        let state = self.state.lock();
        state.scans.len() + state.auths.len() + state.execs.len()
    }
}

fn chrono_duration(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::hours(1))
}
