//! Data-exfiltration classifier.
//!
//! Compares outbound volume against a per-deployment baseline and stacks
//! secondary signals: burst speed, non-standard high ports, off-hours
//! timing. The hour is taken from the record timestamp so a replayed batch
//! scores the same as live traffic.

use chrono::Timelike;

use nta_common::Connection;

const BURST_BYTES: i64 = 10 * 1024 * 1024;

/// Score a connection for bulk data theft against `baseline_bytes` of
/// normal outbound volume. Returns `(flagged, score)`; flagged when the
/// score exceeds 0.6.
pub fn detect_exfiltration(conn: &Connection, baseline_bytes: i64) -> (bool, f64) {
    let mut score: f64 = 0.0;

    if conn.orig_bytes > baseline_bytes.saturating_mul(5) {
        score += 0.4;
    }

    if conn.duration < 60.0 && conn.orig_bytes > BURST_BYTES {
        score += 0.3;
    }

    if conn.dst_port > 1024 && conn.dst_port != 8080 && conn.dst_port != 8443 {
        score += 0.2;
    }

    let hour = conn.timestamp.hour();
    if hour < 7 || hour > 19 {
        score += 0.1;
    }

    let score = score.min(1.0);
    (score > 0.6, score)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: i64 = 1024 * 1024;

    fn conn(ts: &str, dst_port: u16, duration: f64, orig: i64) -> Connection {
        let raw = format!(
            r#"{{"ts": "{}", "src_ip": "10.0.0.5", "dst_ip": "203.0.113.9",
                "dst_port": {}, "duration": {}, "orig_bytes": {}}}"#,
            ts, dst_port, duration, orig
        );
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn night_burst_to_high_port_is_flagged() {
        let c = conn("2026-01-10T02:30:00Z", 9001, 20.0, 40 * MIB);
        let (flagged, score) = detect_exfiltration(&c, MIB);
        assert!(flagged);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn business_hours_upload_below_burst_stays_clean() {
        let c = conn("2026-01-10T14:00:00Z", 443, 120.0, 2 * MIB);
        let (flagged, score) = detect_exfiltration(&c, MIB);
        assert!(!flagged);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn hour_comes_from_the_record_not_the_clock() {
        let day = conn("2026-01-10T12:00:00Z", 9001, 20.0, 40 * MIB);
        let night = conn("2026-01-10T03:00:00Z", 9001, 20.0, 40 * MIB);
        let (_, day_score) = detect_exfiltration(&day, MIB);
        let (_, night_score) = detect_exfiltration(&night, MIB);
        assert!((night_score - day_score - 0.1).abs() < 1e-9);
    }
}
