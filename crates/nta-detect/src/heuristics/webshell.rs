//! Web-shell classifier.
//!
//! Matches request strings (URI, user-agent, posted fragments) against a
//! fixed list of interpreter and command-injection markers. Each input
//! string contributes at most one hit so a single noisy field cannot max
//! the score alone.

use regex::Regex;

const SHELL_PATTERNS: &[&str] = &[
    r"eval\(",
    r"base64_decode",
    r"system\(",
    r"exec\(",
    r"passthru",
    r"shell_exec",
    r"phpinfo\(",
    r"assert\(",
    r"<\?php",
    r"cmd=",
    r"<\?=",
];

/// Score request strings for web-shell markers. Returns `(flagged, score)`
/// with score = 0.3 per matching input string, capped at 1.0; flagged when
/// the score exceeds 0.5.
pub fn detect_webshell(inputs: &[String]) -> (bool, f64) {
    let patterns: Vec<Regex> = SHELL_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

    let mut matches = 0usize;
    for input in inputs {
        if patterns.iter().any(|re| re.is_match(input)) {
            matches += 1;
        }
    }

    let score = (0.3 * matches as f64).min(1.0);
    (score > 0.5, score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_marker_is_below_threshold() {
        let (flagged, score) = detect_webshell(&strings(&["/upload.php?cmd=whoami"]));
        assert!(!flagged);
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn two_marked_strings_trip_the_detector() {
        let (flagged, score) = detect_webshell(&strings(&[
            "/shell.php?cmd=id",
            "eval(base64_decode($_POST['x']))",
        ]));
        assert!(flagged);
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn one_string_counts_once_despite_many_markers() {
        let (flagged, score) =
            detect_webshell(&strings(&["<?php eval(system(exec(passthru($c))));"]));
        assert!(!flagged);
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn clean_request_scores_zero() {
        let (flagged, score) = detect_webshell(&strings(&["/index.html", "Mozilla/5.0"]));
        assert!(!flagged);
        assert_eq!(score, 0.0);
    }
}
