//! Command-and-control channel classifier.
//!
//! Looks for beacon-shaped flows: long-lived, low-volume, symmetric, or
//! bound for ports favored by off-the-shelf implants. Handshake failures
//! (S0/REJ) halve the score since there was no channel to speak of.

use nta_common::Connection;

const IMPLANT_PORTS: &[u16] = &[4444, 5555, 6666, 7777, 8888, 9999, 1337, 31337];

/// Score a connection for C2 traffic. Returns `(flagged, score, tag)` where
/// the tag names the dominant signal (`beacon`, `uncommon_port`, or
/// `suspicious` when flagged without a named signal). Flagged when the
/// score exceeds 0.5.
pub fn detect_c2(conn: &Connection) -> (bool, f64, &'static str) {
    let mut score: f64 = 0.0;
    let mut tag = "";

    if conn.duration > 300.0 && conn.orig_bytes < 1000 && conn.resp_bytes < 1000 {
        score += 0.3;
        tag = "beacon";
    }

    if (conn.dst_port == 443 || conn.dst_port == 8443) && conn.resp_bytes > 0 {
        let ratio = conn.orig_bytes as f64 / conn.resp_bytes as f64;
        if ratio > 0.8 && ratio < 1.2 {
            score += 0.2;
        }
    }

    if IMPLANT_PORTS.contains(&conn.dst_port) {
        score += 0.3;
        tag = "uncommon_port";
    }

    if conn.conn_state == "S0" || conn.conn_state == "REJ" {
        score /= 2.0;
    }

    let score = score.min(1.0);
    let flagged = score > 0.5;
    if flagged && tag.is_empty() {
        tag = "suspicious";
    }
    (flagged, score, tag)
}
