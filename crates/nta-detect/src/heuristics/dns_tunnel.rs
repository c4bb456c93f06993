//! DNS tunnelling classifier.
//!
//! Works on a batch of queries from one client. Tunnels show up as long
//! encoded names, high query rates, and a wide spread of distinct names
//! under the carrier domain.

use std::collections::HashSet;

use nta_common::DnsQuery;

/// Score a query batch for tunnelling. Returns `(flagged, score)`; flagged
/// when the score exceeds 0.6. Batches under 10 queries are too small to
/// judge.
pub fn detect_dns_tunnel(queries: &[DnsQuery]) -> (bool, f64) {
    if queries.len() < 10 {
        return (false, 0.0);
    }

    let dns: Vec<&DnsQuery> = queries.iter().filter(|q| q.dst_port == 53).collect();
    if dns.is_empty() {
        return (false, 0.0);
    }

    let mut score: f64 = 0.0;

    let total_len: usize = dns.iter().map(|q| q.query.len()).sum();
    if total_len as f64 / dns.len() as f64 > 50.0 {
        score += 0.4;
    }

    // Queries-per-second over a one-minute batch window.
    if dns.len() as f64 / 60.0 > 10.0 {
        score += 0.3;
    }

    let distinct: HashSet<&str> = dns.iter().map(|q| q.query.as_str()).collect();
    if distinct.len() > 20 {
        score += 0.3;
    }

    let score = score.min(1.0);
    (score > 0.6, score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(name: &str) -> DnsQuery {
        let raw = format!(r#"{{"src_ip": "10.0.0.5", "query": "{}"}}"#, name);
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn small_batch_is_not_judged() {
        let queries: Vec<DnsQuery> = (0..9).map(|i| query(&format!("q{}.t.example", i))).collect();
        assert_eq!(detect_dns_tunnel(&queries), (false, 0.0));
    }

    #[test]
    fn long_names_and_wide_spread_flag_a_tunnel() {
        // 25 distinct 60+ char names: length and spread signals fire.
        let queries: Vec<DnsQuery> = (0..25)
            .map(|i| {
                query(&format!(
                    "{:0>52}.tunnel.example.com",
                    format!("{:x}", i * 7919)
                ))
            })
            .collect();
        let (flagged, score) = detect_dns_tunnel(&queries);
        assert!(flagged);
        assert!((score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn repeated_short_lookups_stay_clean() {
        let queries: Vec<DnsQuery> = (0..30).map(|_| query("mail.example.com")).collect();
        let (flagged, score) = detect_dns_tunnel(&queries);
        assert!(!flagged);
        assert_eq!(score, 0.0);
    }
}
