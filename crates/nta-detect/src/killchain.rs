//! APT kill-chain correlation.
//!
//! Maps detection events onto the seven-phase kill chain per entity and
//! raises an alert once an entity has progressed through three distinct
//! phases. A phase is overwritten on recurrence, so repeats never inflate
//! the count; the alert re-fires on every qualifying event rather than
//! latching. An in-memory IOC set supports exact-match hunting.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

use nta_common::{Alert, Severity};

/// Kill-chain phases in attack order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KillChainPhase {
    Reconnaissance,
    Weaponization,
    Delivery,
    Exploitation,
    Installation,
    CommandControl,
    ActionsObjectives,
}

impl KillChainPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillChainPhase::Reconnaissance => "reconnaissance",
            KillChainPhase::Weaponization => "weaponization",
            KillChainPhase::Delivery => "delivery",
            KillChainPhase::Exploitation => "exploitation",
            KillChainPhase::Installation => "installation",
            KillChainPhase::CommandControl => "command_control",
            KillChainPhase::ActionsObjectives => "actions_objectives",
        }
    }
}

/// Classify a detection event type onto a phase. Unknown types carry no
/// phase information.
fn phase_for(event_type: &str) -> Option<KillChainPhase> {
    match event_type {
        "port_scan" | "host_discovery" => Some(KillChainPhase::Reconnaissance),
        "malware_download" => Some(KillChainPhase::Weaponization),
        "exploit_attempt" | "buffer_overflow" => Some(KillChainPhase::Exploitation),
        "persistence_mechanism" | "registry_modification" => Some(KillChainPhase::Installation),
        "c2_communication" | "beacon_traffic" => Some(KillChainPhase::CommandControl),
        "data_exfiltration" | "lateral_movement" => Some(KillChainPhase::ActionsObjectives),
        _ => None,
    }
}

struct ChainEntry {
    phases: HashMap<KillChainPhase, DateTime<Utc>>,
    last_seen: DateTime<Utc>,
}

#[derive(Default)]
pub struct KillChainTracker {
    chains: RwLock<HashMap<String, ChainEntry>>,
    iocs: RwLock<HashMap<String, HashSet<String>>>,
}

impl KillChainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a detection event into the entity's chain. Returns an alert
    /// whenever the entity holds three or more distinct phases.
    pub fn analyze_event(
        &self,
        entity: &str,
        event_type: &str,
        ts: DateTime<Utc>,
    ) -> Option<Alert> {
        let mut chains = self.chains.write();
        let entry = chains.entry(entity.to_string()).or_insert_with(|| ChainEntry {
            phases: HashMap::new(),
            last_seen: ts,
        });
        entry.last_seen = ts;

        let phase = match phase_for(event_type) {
            Some(p) => p,
            None => return None,
        };
        entry.phases.insert(phase, ts);

        if entry.phases.len() >= 3 {
            let mut phases: Vec<&str> = entry.phases.keys().map(|p| p.as_str()).collect();
            phases.sort_unstable();
            debug!(entity, phases = ?phases, "kill chain progressed");
            return Some(
                Alert::new(
                    "apt_kill_chain",
                    Severity::Critical,
                    0.95,
                    format!(
                        "entity {} progressed through kill-chain phases: {}",
                        entity,
                        phases.join(", ")
                    ),
                )
                .with_endpoints(entity, "")
                .at(ts),
            );
        }
        None
    }

    /// Exact-match lookup against the loaded IOC set.
    pub fn hunt_ioc(&self, ioc_type: &str, value: &str) -> bool {
        self.iocs
            .read()
            .get(ioc_type)
            .map(|values| values.contains(value))
            .unwrap_or(false)
    }

    /// Replace the IOC set wholesale.
    pub fn load_iocs(&self, iocs: HashMap<String, HashSet<String>>) {
        *self.iocs.write() = iocs;
    }

    /// Evict entities idle longer than `max_age`.
    pub fn clean_old_chains(&self, max_age: Duration) {
        let cutoff =
            Utc::now() - ChronoDuration::from_std(max_age).unwrap_or_else(|_| ChronoDuration::hours(24));
        self.chains.write().retain(|_, e| e.last_seen > cutoff);
    }

    /// Tracked entity count (for stats snapshots).
    pub fn tracked_entities(&self) -> usize {
        self.chains.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_distinct_phases_raise_an_alert() {
        let t = KillChainTracker::new();
        let now = Utc::now();

        assert!(t.analyze_event("10.0.0.5", "port_scan", now).is_none());
        assert!(t.analyze_event("10.0.0.5", "malware_download", now).is_none());
        let alert = t.analyze_event("10.0.0.5", "c2_communication", now).unwrap();
        assert_eq!(alert.alert_type, "apt_kill_chain");
        assert_eq!(alert.severity, Severity::Critical);
        assert!(alert.description.contains("reconnaissance"));
    }

    #[test]
    fn repeated_phase_does_not_advance_the_chain() {
        let t = KillChainTracker::new();
        let now = Utc::now();

        t.analyze_event("10.0.0.5", "port_scan", now);
        t.analyze_event("10.0.0.5", "host_discovery", now);
        t.analyze_event("10.0.0.5", "port_scan", now);
        assert!(t.analyze_event("10.0.0.5", "beacon_traffic", now).is_none());
    }

    #[test]
    fn alert_refires_on_later_qualifying_events() {
        let t = KillChainTracker::new();
        let now = Utc::now();

        t.analyze_event("10.0.0.5", "port_scan", now);
        t.analyze_event("10.0.0.5", "exploit_attempt", now);
        assert!(t.analyze_event("10.0.0.5", "c2_communication", now).is_some());
        assert!(t.analyze_event("10.0.0.5", "data_exfiltration", now).is_some());
    }

    #[test]
    fn unknown_event_type_only_touches_last_seen() {
        let t = KillChainTracker::new();
        let now = Utc::now();

        t.analyze_event("10.0.0.5", "port_scan", now);
        t.analyze_event("10.0.0.5", "exploit_attempt", now);
        assert!(t.analyze_event("10.0.0.5", "coffee_break", now).is_none());
        assert_eq!(t.tracked_entities(), 1);
    }

    #[test]
    fn entities_track_independently() {
        let t = KillChainTracker::new();
        let now = Utc::now();

        t.analyze_event("10.0.0.5", "port_scan", now);
        t.analyze_event("10.0.0.6", "malware_download", now);
        t.analyze_event("10.0.0.5", "exploit_attempt", now);
        assert!(t.analyze_event("10.0.0.6", "c2_communication", now).is_none());
    }

    #[test]
    fn ioc_hunting_is_exact_match() {
        let t = KillChainTracker::new();
        let mut iocs = HashMap::new();
        iocs.insert(
            "ip".to_string(),
            ["203.0.113.9".to_string()].into_iter().collect(),
        );
        t.load_iocs(iocs);

        assert!(t.hunt_ioc("ip", "203.0.113.9"));
        assert!(!t.hunt_ioc("ip", "203.0.113.10"));
        assert!(!t.hunt_ioc("domain", "203.0.113.9"));
    }

    #[test]
    fn idle_chains_are_evicted() {
        let t = KillChainTracker::new();
        t.analyze_event("10.0.0.5", "port_scan", Utc::now() - ChronoDuration::hours(30));
        t.analyze_event("10.0.0.6", "port_scan", Utc::now());
        t.clean_old_chains(Duration::from_secs(24 * 3600));
        assert_eq!(t.tracked_entities(), 1);
    }
}
