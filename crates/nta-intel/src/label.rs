//! Threat label classification.
//!
//! Maps an indicator's free-text metadata to a human-readable threat
//! category. Pure function over the indicator; keyword order matters:
//! threat-type tags win over malware-family keywords, which win over the
//! severity fallback.

use crate::Indicator;
use nta_common::Severity;

/// Threat-type tags as emitted by feed APIs.
const THREAT_TYPE_LABELS: &[(&str, &str)] = &[
    ("botnet_cc", "botnet C2"),
    ("payload_delivery", "malware distribution"),
    ("command_control", "botnet C2"),
    ("c2", "botnet C2"),
];

/// Malware-family keywords found in descriptions and tag lists.
const MALWARE_LABELS: &[(&str, &str)] = &[
    ("remote access", "remote access trojan"),
    ("rat", "remote access trojan"),
    ("gh0st", "remote access trojan"),
    ("ghost", "remote access trojan"),
    ("sectop", "remote access trojan"),
    ("adaptix", "remote access trojan"),
    ("meterpreter", "offensive tooling"),
    ("cobalt", "offensive tooling"),
    ("metasploit", "offensive tooling"),
    ("stealer", "infostealer"),
    ("stealc", "infostealer"),
    ("lumma", "infostealer"),
    ("redline", "infostealer"),
    ("hook", "infostealer"),
    ("cryptominer", "cryptominer"),
    ("miner", "cryptominer"),
    ("xmrig", "cryptominer"),
    ("ransomware", "ransomware"),
    ("locker", "ransomware"),
    ("trojan", "trojan"),
    ("backdoor", "backdoor"),
    ("phishing", "phishing"),
    ("clearfake", "phishing"),
    ("fakeupdates", "phishing"),
    ("apt", "APT group"),
    ("muddywater", "APT group"),
    ("lazarus", "APT group"),
    ("shadowpad", "spyware"),
    ("spy", "spyware"),
    ("espionage", "spyware"),
];

/// Derive the display label for an indicator.
pub fn threat_label(intel: &Indicator) -> &'static str {
    let combined = format!(
        "{} {} {}",
        intel.description.to_lowercase(),
        intel.tags.join(" ").to_lowercase(),
        intel.source.to_lowercase()
    );

    for &(keyword, label) in THREAT_TYPE_LABELS {
        if combined.contains(keyword) {
            return label;
        }
    }

    for &(keyword, label) in MALWARE_LABELS {
        if combined.contains(keyword) {
            return label;
        }
    }

    match intel.severity {
        Severity::Critical | Severity::High => "high-risk threat",
        Severity::Medium => "malicious address",
        Severity::Low => "suspicious address",
        Severity::None => "malicious address",
    }
}
