//! Traffic records produced by the capture probe.
//!
//! Each event-bus topic carries exactly one of these schemas. Records are
//! immutable once decoded; detectors only ever borrow them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single parsed network observation, tagged by topic schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record {
    Conn(Connection),
    Dns(DnsQuery),
    Http(HttpTransaction),
    Tls(TlsHandshake),
    Notice(Notice),
}

impl Record {
    /// Timestamp carried by the underlying record.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Record::Conn(c) => c.timestamp,
            Record::Dns(d) => d.timestamp,
            Record::Http(h) => h.timestamp,
            Record::Tls(t) => t.timestamp,
            Record::Notice(n) => n.timestamp,
        }
    }
}

/// Connection summary (one row per flow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default)]
    pub uid: String,
    #[serde(rename = "ts", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    #[serde(default)]
    pub src_port: u16,
    pub dst_ip: String,
    #[serde(default)]
    pub dst_port: u16,
    #[serde(rename = "proto", default)]
    pub protocol: String,
    #[serde(default)]
    pub service: String,
    /// Flow duration in seconds.
    #[serde(default)]
    pub duration: f64,
    /// Bytes sent by the originator.
    #[serde(default)]
    pub orig_bytes: i64,
    /// Bytes sent by the responder.
    #[serde(default)]
    pub resp_bytes: i64,
    /// Probe connection-state tag (e.g. SF, S0, REJ).
    #[serde(default)]
    pub conn_state: String,
}

/// DNS query record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsQuery {
    #[serde(rename = "ts", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub src_ip: String,
    #[serde(default)]
    pub src_port: u16,
    #[serde(default)]
    pub dst_ip: String,
    #[serde(default = "default_dns_port")]
    pub dst_port: u16,
    pub query: String,
    #[serde(default)]
    pub qtype: String,
    #[serde(default)]
    pub answers: Vec<String>,
}

fn default_dns_port() -> u16 {
    53
}

/// HTTP transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTransaction {
    #[serde(rename = "ts", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub src_ip: String,
    #[serde(default)]
    pub dst_ip: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub request_body_len: i64,
    #[serde(default)]
    pub response_body_len: i64,
}

/// TLS handshake metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsHandshake {
    #[serde(rename = "ts", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub uid: String,
    pub src_ip: String,
    #[serde(default)]
    pub src_port: u16,
    pub dst_ip: String,
    #[serde(default)]
    pub dst_port: u16,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "cipher", default)]
    pub cipher_suite: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub ja3: String,
    #[serde(default)]
    pub ja3s: String,
}

/// Free-form probe notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    #[serde(rename = "ts", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "src", default)]
    pub src_ip: String,
    pub note: String,
    #[serde(default)]
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_decodes_probe_json() {
        let raw = r#"{
            "uid": "CX1",
            "ts": "2026-01-10T08:00:00Z",
            "src_ip": "10.0.0.5",
            "src_port": 51233,
            "dst_ip": "203.0.113.9",
            "dst_port": 443,
            "proto": "tcp",
            "service": "ssl",
            "duration": 12.5,
            "orig_bytes": 840,
            "resp_bytes": 912,
            "conn_state": "SF"
        }"#;
        let conn: Connection = serde_json::from_str(raw).unwrap();
        assert_eq!(conn.dst_port, 443);
        assert_eq!(conn.orig_bytes, 840);
        assert_eq!(conn.conn_state, "SF");
    }

    #[test]
    fn dns_defaults_apply() {
        let raw = r#"{"src_ip": "10.0.0.5", "query": "example.com"}"#;
        let q: DnsQuery = serde_json::from_str(raw).unwrap();
        assert_eq!(q.dst_port, 53);
        assert!(q.answers.is_empty());
    }
}
