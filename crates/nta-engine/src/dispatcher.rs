//! Per-topic record dispatcher.
//!
//! One handler per topic schema. A handler runs the relevant intel checks
//! and classifiers, feeds the correlation trackers, persists any alerts,
//! and always persists the raw record. Alert-write failures are logged and
//! never block the record path; reprocessing a record is safe for the
//! trackers but duplicates alerts (the bus is at-least-once).

use std::sync::Arc;
use tracing::warn;

use nta_common::{
    Alert, Connection, DetectionConfig, DnsQuery, EngineError, EngineResult, HttpTransaction,
    Notice, Record, Severity, TlsHandshake,
};
use nta_detect::heuristics::{detect_c2, detect_dga, detect_exfiltration, detect_webshell};
use nta_detect::{KillChainTracker, LateralMovementTracker};
use nta_intel::{Indicator, IntelService};

use crate::storage::EventStore;

/// Event-bus topics the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Conn,
    Dns,
    Http,
    Ssl,
    Notice,
}

impl Topic {
    pub const ALL: [Topic; 5] = [Topic::Conn, Topic::Dns, Topic::Http, Topic::Ssl, Topic::Notice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Conn => "zeek-conn",
            Topic::Dns => "zeek-dns",
            Topic::Http => "zeek-http",
            Topic::Ssl => "zeek-ssl",
            Topic::Notice => "zeek-notice",
        }
    }

    pub fn parse(name: &str) -> Option<Topic> {
        match name {
            "zeek-conn" => Some(Topic::Conn),
            "zeek-dns" => Some(Topic::Dns),
            "zeek-http" => Some(Topic::Http),
            "zeek-ssl" => Some(Topic::Ssl),
            "zeek-notice" => Some(Topic::Notice),
            _ => None,
        }
    }
}

pub struct Dispatcher {
    intel: Arc<IntelService>,
    lateral: Arc<LateralMovementTracker>,
    killchain: Arc<KillChainTracker>,
    store: Arc<dyn EventStore>,
    exfil_baseline: i64,
}

impl Dispatcher {
    pub fn new(
        intel: Arc<IntelService>,
        lateral: Arc<LateralMovementTracker>,
        killchain: Arc<KillChainTracker>,
        store: Arc<dyn EventStore>,
        detection: &DetectionConfig,
    ) -> Self {
        Self {
            intel,
            lateral,
            killchain,
            store,
            exfil_baseline: detection.exfil_baseline_bytes,
        }
    }

    /// Decode a payload against the topic schema and run its handler.
    /// Returns the number of alerts emitted.
    pub async fn dispatch(&self, topic: Topic, payload: &[u8]) -> EngineResult<usize> {
        match topic {
            Topic::Conn => {
                let conn: Connection = decode(topic, payload)?;
                self.handle_conn(conn).await
            }
            Topic::Dns => {
                let query: DnsQuery = decode(topic, payload)?;
                self.handle_dns(query).await
            }
            Topic::Http => {
                let tx: HttpTransaction = decode(topic, payload)?;
                self.handle_http(tx).await
            }
            Topic::Ssl => {
                let hs: TlsHandshake = decode(topic, payload)?;
                self.handle_ssl(hs).await
            }
            Topic::Notice => {
                let notice: Notice = decode(topic, payload)?;
                self.handle_notice(notice).await
            }
        }
    }

    async fn handle_conn(&self, conn: Connection) -> EngineResult<usize> {
        let mut alerts = Vec::new();

        for ip in [&conn.src_ip, &conn.dst_ip] {
            let verdict = self.intel.check_ip(ip).await;
            if !verdict.is_benign() {
                alerts.push(
                    intel_alert(&verdict)
                        .with_endpoints(conn.src_ip.clone(), conn.dst_ip.clone())
                        .at(conn.timestamp),
                );
            }
        }

        let (c2, c2_score, c2_tag) = detect_c2(&conn);
        if c2 {
            alerts.push(
                Alert::new(
                    "c2_communication",
                    Severity::High,
                    c2_score,
                    format!(
                        "C2 channel ({}) from {} to {}:{}",
                        c2_tag, conn.src_ip, conn.dst_ip, conn.dst_port
                    ),
                )
                .with_endpoints(conn.src_ip.clone(), conn.dst_ip.clone())
                .at(conn.timestamp),
            );
            self.feed_chain(&conn, "c2_communication", &mut alerts);
        }

        let (exfil, exfil_score) = detect_exfiltration(&conn, self.exfil_baseline);
        if exfil {
            alerts.push(
                Alert::new(
                    "data_exfiltration",
                    Severity::Critical,
                    exfil_score,
                    format!(
                        "{} bytes out from {} to {}:{}",
                        conn.orig_bytes, conn.src_ip, conn.dst_ip, conn.dst_port
                    ),
                )
                .with_endpoints(conn.src_ip.clone(), conn.dst_ip.clone())
                .at(conn.timestamp),
            );
            self.feed_chain(&conn, "data_exfiltration", &mut alerts);
        }

        if let Some(alert) = self.lateral.observe_connection(&conn) {
            alerts.push(alert);
            self.feed_chain(&conn, "lateral_movement", &mut alerts);
        }

        self.finish(alerts, Record::Conn(conn)).await
    }

    fn feed_chain(&self, conn: &Connection, event_type: &str, alerts: &mut Vec<Alert>) {
        if let Some(alert) = self
            .killchain
            .analyze_event(&conn.src_ip, event_type, conn.timestamp)
        {
            alerts.push(alert);
        }
    }

    async fn handle_dns(&self, query: DnsQuery) -> EngineResult<usize> {
        let mut alerts = Vec::new();

        let verdict = self.intel.check_domain(&query.query).await;
        if !verdict.is_benign() {
            alerts.push(
                intel_alert(&verdict)
                    .with_endpoints(query.src_ip.clone(), query.dst_ip.clone())
                    .at(query.timestamp),
            );
        }

        let (dga, dga_score) = detect_dga(&query.query);
        if dga {
            alerts.push(
                Alert::new(
                    "dga_domain",
                    Severity::Medium,
                    dga_score,
                    format!("algorithmically generated domain: {}", query.query),
                )
                .with_endpoints(query.src_ip.clone(), query.dst_ip.clone())
                .at(query.timestamp),
            );
        }

        self.finish(alerts, Record::Dns(query)).await
    }

    async fn handle_http(&self, tx: HttpTransaction) -> EngineResult<usize> {
        let mut alerts = Vec::new();

        let inputs = vec![tx.uri.clone(), tx.user_agent.clone()];
        let (shell, shell_score) = detect_webshell(&inputs);
        if shell {
            alerts.push(
                Alert::new(
                    "webshell",
                    Severity::Critical,
                    shell_score,
                    format!("web shell markers in {} {}{}", tx.method, tx.host, tx.uri),
                )
                .with_endpoints(tx.src_ip.clone(), tx.dst_ip.clone())
                .at(tx.timestamp),
            );
        }

        self.finish(alerts, Record::Http(tx)).await
    }

    async fn handle_ssl(&self, hs: TlsHandshake) -> EngineResult<usize> {
        let mut alerts = Vec::new();

        if !hs.server_name.is_empty() {
            let verdict = self.intel.check_domain(&hs.server_name).await;
            if !verdict.is_benign() {
                alerts.push(
                    intel_alert(&verdict)
                        .with_endpoints(hs.src_ip.clone(), hs.dst_ip.clone())
                        .at(hs.timestamp),
                );
            }
        }

        let verdict = self.intel.check_ip(&hs.dst_ip).await;
        if !verdict.is_benign() {
            alerts.push(
                intel_alert(&verdict)
                    .with_endpoints(hs.src_ip.clone(), hs.dst_ip.clone())
                    .at(hs.timestamp),
            );
        }

        self.finish(alerts, Record::Tls(hs)).await
    }

    async fn handle_notice(&self, notice: Notice) -> EngineResult<usize> {
        let alert = Alert::new(notice.note.clone(), Severity::High, 0.8, notice.msg.clone())
            .with_endpoints(notice.src_ip.clone(), "")
            .at(notice.timestamp);
        self.finish(vec![alert], Record::Notice(notice)).await
    }

    /// Persist alerts best-effort, then the raw record.
    async fn finish(&self, alerts: Vec<Alert>, record: Record) -> EngineResult<usize> {
        let emitted = alerts.len();
        for alert in &alerts {
            if let Err(e) = self.store.save_alert(alert).await {
                warn!(alert_type = %alert.alert_type, error = %e, "failed to persist alert");
            }
        }
        if let Err(e) = self.store.save_record(&record).await {
            warn!(error = %e, "failed to persist record");
        }
        Ok(emitted)
    }
}

/// Alert for a non-benign intel verdict; severity is carried over from the
/// indicator.
fn intel_alert(verdict: &Indicator) -> Alert {
    let mut alert = Alert::new(
        "threat_intel_match",
        verdict.severity,
        0.95,
        format!(
            "{} {} matched threat intelligence ({})",
            verdict.indicator_type.as_str(),
            verdict.value,
            verdict.threat_label
        ),
    );
    alert.threat_label = verdict.threat_label.clone();
    alert.threat_source = verdict.source.clone();
    alert
}

fn decode<T: serde::de::DeserializeOwned>(topic: Topic, payload: &[u8]) -> EngineResult<T> {
    serde_json::from_slice(payload).map_err(|source| EngineError::Decode {
        topic: topic.as_str().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FailingEventStore, MemEventStore};
    use nta_common::EngineConfig;
    use nta_intel::{IndicatorType, IntelStore, MemIntelStore};
    use std::time::Duration;

    fn dispatcher_with(
        intel_store: Arc<MemIntelStore>,
        event_store: Arc<dyn EventStore>,
    ) -> Dispatcher {
        let config = EngineConfig::default();
        let intel = Arc::new(IntelService::new(
            intel_store,
            Vec::new(),
            Duration::from_secs(3600),
        ));
        Dispatcher::new(
            intel,
            Arc::new(LateralMovementTracker::new(&config.detection)),
            Arc::new(KillChainTracker::new()),
            event_store,
            &config.detection,
        )
    }

    fn dispatcher() -> (Dispatcher, Arc<MemEventStore>) {
        let events = Arc::new(MemEventStore::new());
        let d = dispatcher_with(Arc::new(MemIntelStore::new()), events.clone());
        (d, events)
    }

    #[test]
    fn topic_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::parse(topic.as_str()), Some(topic));
        }
        assert_eq!(Topic::parse("zeek-files"), None);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_error() {
        let (d, events) = dispatcher();
        let err = d.dispatch(Topic::Conn, b"{not json").await.unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
        assert_eq!(events.record_count(), 0);
    }

    #[tokio::test]
    async fn clean_conn_persists_record_without_alerts() {
        let (d, events) = dispatcher();
        let payload = br#"{"src_ip": "10.0.0.5", "dst_ip": "10.0.0.6",
            "dst_port": 443, "duration": 2.0,
            "orig_bytes": 500, "resp_bytes": 40000, "conn_state": "SF"}"#;
        let emitted = d.dispatch(Topic::Conn, payload).await.unwrap();
        assert_eq!(emitted, 0);
        assert_eq!(events.record_count(), 1);
        assert_eq!(events.alert_count(), 0);
    }

    #[tokio::test]
    async fn flagged_destination_raises_intel_match() {
        let intel_store = Arc::new(MemIntelStore::new());
        let mut known = nta_intel::Indicator::benign(IndicatorType::Ip, "203.0.113.9");
        known.severity = Severity::Critical;
        known.source = "threatfox".to_string();
        known.threat_label = "botnet C2".to_string();
        intel_store.upsert(known).await.unwrap();

        let events = Arc::new(MemEventStore::new());
        let d = dispatcher_with(intel_store, events.clone());

        let payload = br#"{"src_ip": "10.0.0.5", "dst_ip": "203.0.113.9",
            "dst_port": 443, "duration": 2.0,
            "orig_bytes": 500, "resp_bytes": 40000, "conn_state": "SF"}"#;
        let emitted = d.dispatch(Topic::Conn, payload).await.unwrap();
        assert_eq!(emitted, 1);

        let matches = events.alerts_of_type("threat_intel_match");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].severity, Severity::Critical);
        assert_eq!(matches[0].threat_label, "botnet C2");
        assert_eq!(matches[0].threat_source, "threatfox");
    }

    #[tokio::test]
    async fn beacon_conn_raises_c2_and_feeds_the_chain() {
        let (d, events) = dispatcher();
        let payload = br#"{"src_ip": "10.0.0.5", "dst_ip": "203.0.113.9",
            "dst_port": 4444, "duration": 900.0,
            "orig_bytes": 400, "resp_bytes": 420, "conn_state": "SF"}"#;
        let emitted = d.dispatch(Topic::Conn, payload).await.unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(events.alerts_of_type("c2_communication").len(), 1);
    }

    #[tokio::test]
    async fn dga_query_raises_a_medium_alert() {
        let (d, events) = dispatcher();
        let payload = br#"{"src_ip": "10.0.0.5", "query": "x7k9q2m4p8w3z5v1b6.net"}"#;
        let emitted = d.dispatch(Topic::Dns, payload).await.unwrap();
        assert_eq!(emitted, 1);

        let alerts = events.alerts_of_type("dga_domain");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(events.record_count(), 1);
    }

    #[tokio::test]
    async fn webshell_request_raises_a_critical_alert() {
        let (d, events) = dispatcher();
        let payload = br#"{"src_ip": "198.51.100.7", "dst_ip": "10.0.0.80",
            "method": "POST", "host": "www.example.com",
            "uri": "/shell.php?cmd=id",
            "user_agent": "eval(base64_decode($_POST['x']))"}"#;
        let emitted = d.dispatch(Topic::Http, payload).await.unwrap();
        assert_eq!(emitted, 1);
        assert_eq!(events.alerts_of_type("webshell").len(), 1);
    }

    #[tokio::test]
    async fn notice_converts_directly_to_an_alert() {
        let (d, events) = dispatcher();
        let payload = br#"{"src": "10.0.0.5", "note": "Scan::Port_Scan",
            "msg": "10.0.0.5 scanned 50 ports"}"#;
        let emitted = d.dispatch(Topic::Notice, payload).await.unwrap();
        assert_eq!(emitted, 1);

        let alerts = events.alerts_of_type("Scan::Port_Scan");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].description, "10.0.0.5 scanned 50 ports");
    }

    #[tokio::test]
    async fn store_failures_do_not_fail_the_dispatch() {
        let d = dispatcher_with(Arc::new(MemIntelStore::new()), Arc::new(FailingEventStore));
        let payload = br#"{"src": "10.0.0.5", "note": "X", "msg": "y"}"#;
        let emitted = d.dispatch(Topic::Notice, payload).await.unwrap();
        assert_eq!(emitted, 1);
    }
}
