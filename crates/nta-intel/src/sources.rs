//! External threat-intelligence source clients.
//!
//! Two wire protocols are supported: a POST-based bulk/search API keyed by
//! an `Auth-Key` header (ThreatFox-compatible) and a GET-based per-indicator
//! REST API keyed by `X-OTX-API-KEY` (OTX-compatible). Both normalize into
//! the common `Indicator` shape. A source's contract is "verdict or
//! no-opinion": not-found is `Ok(None)`, never an error.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{label::threat_label, Indicator, IndicatorType, IntelError};
use nta_common::{Severity, SourceConfig, SourceKind};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
const BULK_TIMEOUT: Duration = Duration::from_secs(30);

/// Days a bulk-fetched indicator stays valid past its first sighting.
const FEED_VALIDITY_DAYS: i64 = 90;

/// A queryable external intelligence source.
#[async_trait]
pub trait IntelSource: Send + Sync {
    fn name(&self) -> &str;

    /// Per-indicator verdict; `Ok(None)` means no opinion.
    async fn lookup(
        &self,
        indicator_type: IndicatorType,
        value: &str,
    ) -> Result<Option<Indicator>, IntelError>;

    /// Full feed pull for the synchronizer.
    async fn bulk_fetch(&self) -> Result<Vec<Indicator>, IntelError>;
}

/// Build a source client from its config descriptor.
pub fn source_from_config(cfg: &SourceConfig) -> std::sync::Arc<dyn IntelSource> {
    match cfg.kind {
        SourceKind::BulkSearch => std::sync::Arc::new(ThreatFoxSource::new(
            cfg.name.clone(),
            cfg.url.clone(),
            cfg.api_key.clone(),
        )),
        SourceKind::PulseRest => std::sync::Arc::new(OtxSource::new(
            cfg.name.clone(),
            cfg.url.clone(),
            cfg.api_key.clone(),
        )),
    }
}

// =============================================================================
// ThreatFox-style POST API
// =============================================================================

pub struct ThreatFoxSource {
    name: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FoxResponse {
    query_status: String,
    #[serde(default)]
    data: Vec<FoxRow>,
}

#[derive(Debug, Deserialize)]
struct FoxRow {
    ioc: String,
    #[serde(default)]
    ioc_type: String,
    #[serde(default)]
    threat_type_desc: String,
    #[serde(default)]
    malware_printable: String,
    #[serde(default)]
    malware_alias: String,
    #[serde(default)]
    confidence_level: i64,
    #[serde(default)]
    first_seen: Option<String>,
    #[serde(default)]
    last_seen: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl ThreatFoxSource {
    pub fn new(name: String, url: String, api_key: String) -> Self {
        Self {
            name,
            url,
            api_key,
            client: reqwest::Client::builder()
                .timeout(LOOKUP_TIMEOUT)
                .build()
                .expect("reqwest client"),
        }
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self.client.post(&self.url).json(body);
        if !self.api_key.is_empty() {
            req = req.header("Auth-Key", &self.api_key);
        }
        req
    }
}

#[async_trait]
impl IntelSource for ThreatFoxSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(
        &self,
        _indicator_type: IndicatorType,
        value: &str,
    ) -> Result<Option<Indicator>, IntelError> {
        let body = serde_json::json!({
            "query": "search_ioc",
            "search_term": value,
        });

        let resp = self.request(&body).send().await?;
        if !resp.status().is_success() {
            return Err(IntelError::Http(resp.status().as_u16()));
        }

        let parsed: FoxResponse = resp
            .json()
            .await
            .map_err(|e| IntelError::Parse(e.to_string()))?;

        if parsed.query_status == "no_result" || parsed.data.is_empty() {
            debug!(source = %self.name, value, "no opinion");
            return Ok(None);
        }

        Ok(Some(indicator_from_fox_row(&parsed.data[0], &self.name)))
    }

    async fn bulk_fetch(&self) -> Result<Vec<Indicator>, IntelError> {
        let body = serde_json::json!({
            "query": "get_iocs",
            "days": "3",
        });

        let resp = self.request(&body).timeout(BULK_TIMEOUT).send().await?;
        if !resp.status().is_success() {
            return Err(IntelError::Http(resp.status().as_u16()));
        }

        let parsed: FoxResponse = resp
            .json()
            .await
            .map_err(|e| IntelError::Parse(e.to_string()))?;

        if parsed.query_status != "ok" {
            return Err(IntelError::SourceStatus(parsed.query_status));
        }

        Ok(parsed
            .data
            .iter()
            .map(|row| indicator_from_fox_row(row, &self.name))
            .collect())
    }
}

fn indicator_from_fox_row(row: &FoxRow, source: &str) -> Indicator {
    let indicator_type = IndicatorType::from_source_tag(&row.ioc_type);

    // IP rows arrive as "addr:port"; strip the port.
    let value = match indicator_type {
        IndicatorType::Ip => row.ioc.split(':').next().unwrap_or(&row.ioc).to_string(),
        _ => row.ioc.clone(),
    };

    let severity = severity_from_confidence(row.confidence_level);

    let mut description = format!("{} ({})", row.threat_type_desc, row.malware_printable);
    if !row.malware_alias.is_empty() {
        description.push_str(&format!(", Alias: {}", row.malware_alias));
    }

    let first_seen = row
        .first_seen
        .as_deref()
        .and_then(parse_feed_time)
        .unwrap_or_else(Utc::now);
    let last_seen = row
        .last_seen
        .as_deref()
        .and_then(parse_feed_time)
        .unwrap_or_else(Utc::now);

    let mut indicator = Indicator {
        indicator_type,
        value,
        severity,
        source: source.to_string(),
        description,
        tags: row.tags.clone().unwrap_or_default(),
        threat_label: String::new(),
        first_seen,
        last_seen,
        valid_until: Some(first_seen + ChronoDuration::days(FEED_VALIDITY_DAYS)),
    };
    indicator.threat_label = threat_label(&indicator).to_string();
    indicator
}

/// Source-provided confidence thresholds: ≥90 high, ≥75 medium, else low.
fn severity_from_confidence(confidence: i64) -> Severity {
    if confidence >= 90 {
        Severity::High
    } else if confidence >= 75 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Feed timestamps look like `2026-08-01 14:03:22 UTC`.
fn parse_feed_time(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim_end_matches(" UTC");
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// =============================================================================
// OTX-style GET REST API
// =============================================================================

pub struct OtxSource {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
struct OtxGeneral {
    #[serde(default)]
    pulse_info: OtxPulseInfo,
}

#[derive(Debug, Default, Deserialize)]
struct OtxPulseInfo {
    #[serde(default)]
    count: i64,
    #[serde(default)]
    pulses: Vec<OtxPulse>,
}

#[derive(Debug, Default, Deserialize)]
struct OtxPulse {
    #[serde(default)]
    adversary: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    malware_families: Vec<OtxMalwareFamily>,
    #[serde(default)]
    indicators: Vec<OtxPulseIndicator>,
}

#[derive(Debug, Default, Deserialize)]
struct OtxMalwareFamily {
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct OtxPulseIndicator {
    #[serde(rename = "type", default)]
    indicator_type: String,
    #[serde(default)]
    indicator: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct OtxAnalysis {
    #[serde(default)]
    malware: OtxMalware,
}

#[derive(Debug, Default, Deserialize)]
struct OtxMalware {
    #[serde(default)]
    count: i64,
    #[serde(default)]
    data: Vec<OtxDetection>,
}

#[derive(Debug, Default, Deserialize)]
struct OtxDetection {
    #[serde(default)]
    detections: i64,
}

#[derive(Debug, Default, Deserialize)]
struct OtxSubscribed {
    #[serde(default)]
    results: Vec<OtxPulse>,
}

impl OtxSource {
    pub fn new(name: String, base_url: String, api_key: String) -> Self {
        Self {
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::builder()
                .timeout(LOOKUP_TIMEOUT)
                .build()
                .expect("reqwest client"),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        timeout: Duration,
    ) -> Result<T, IntelError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("X-OTX-API-KEY", &self.api_key)
            .timeout(timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(IntelError::Http(resp.status().as_u16()));
        }
        resp.json::<T>()
            .await
            .map_err(|e| IntelError::Parse(e.to_string()))
    }

    fn pulse_indicator(&self, value: &str, indicator_type: IndicatorType, info: &OtxPulseInfo) -> Indicator {
        let severity = if info.count > 5 {
            Severity::High
        } else {
            Severity::Medium
        };

        let mut description = format!("Found in {} pulses", info.count);
        let mut tags = Vec::new();
        if let Some(pulse) = info.pulses.first() {
            if !pulse.adversary.is_empty() {
                description.push_str(&format!(", APT: {}", pulse.adversary));
            }
            if let Some(family) = pulse.malware_families.first() {
                description.push_str(&format!(", Malware: {}", family.display_name));
            }
            tags = pulse.tags.clone();
        }

        let now = Utc::now();
        let mut indicator = Indicator {
            indicator_type,
            value: value.to_string(),
            severity,
            source: self.name.clone(),
            description,
            tags,
            threat_label: String::new(),
            first_seen: now,
            last_seen: now,
            valid_until: Some(now + ChronoDuration::days(FEED_VALIDITY_DAYS)),
        };
        indicator.threat_label = threat_label(&indicator).to_string();
        indicator
    }
}

#[async_trait]
impl IntelSource for OtxSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(
        &self,
        indicator_type: IndicatorType,
        value: &str,
    ) -> Result<Option<Indicator>, IntelError> {
        // Hashes go through the analysis endpoint; everything else through
        // the general section.
        if indicator_type == IndicatorType::Hash {
            let analysis: OtxAnalysis = self
                .get_json(
                    &format!("/api/v1/indicators/file/{}/analysis", value),
                    LOOKUP_TIMEOUT,
                )
                .await?;
            if analysis.malware.count == 0 || analysis.malware.data.is_empty() {
                return Ok(None);
            }
            let detections = analysis.malware.data[0].detections;
            let severity = if detections > 10 {
                Severity::High
            } else if detections > 3 {
                Severity::Medium
            } else {
                Severity::Low
            };
            let now = Utc::now();
            let mut indicator = Indicator {
                indicator_type,
                value: value.to_string(),
                severity,
                source: self.name.clone(),
                description: format!("Detected by {} malware engines", detections),
                tags: Vec::new(),
                threat_label: String::new(),
                first_seen: now,
                last_seen: now,
                valid_until: Some(now + ChronoDuration::days(FEED_VALIDITY_DAYS)),
            };
            indicator.threat_label = threat_label(&indicator).to_string();
            return Ok(Some(indicator));
        }

        let section = match indicator_type {
            IndicatorType::Ip => "IPv4",
            IndicatorType::Domain => "domain",
            IndicatorType::Url => "url",
            IndicatorType::Hash => unreachable!(),
        };

        let general: OtxGeneral = self
            .get_json(
                &format!("/api/v1/indicators/{}/{}/general", section, value),
                LOOKUP_TIMEOUT,
            )
            .await?;

        if general.pulse_info.count == 0 {
            debug!(source = %self.name, value, "no opinion");
            return Ok(None);
        }

        Ok(Some(self.pulse_indicator(value, indicator_type, &general.pulse_info)))
    }

    async fn bulk_fetch(&self) -> Result<Vec<Indicator>, IntelError> {
        let subscribed: OtxSubscribed = self
            .get_json("/api/v1/pulses/subscribed", BULK_TIMEOUT)
            .await?;

        let mut out = Vec::new();
        let now = Utc::now();
        for pulse in &subscribed.results {
            for pulse_ind in &pulse.indicators {
                let indicator_type = match pulse_ind.indicator_type.as_str() {
                    "IPv4" | "IPv6" => IndicatorType::Ip,
                    "domain" | "hostname" => IndicatorType::Domain,
                    "URL" => IndicatorType::Url,
                    "FileHash-MD5" | "FileHash-SHA1" | "FileHash-SHA256" => IndicatorType::Hash,
                    _ => continue,
                };

                let mut description = pulse_ind.description.clone();
                if !pulse.adversary.is_empty() {
                    description.push_str(&format!(", APT: {}", pulse.adversary));
                }
                if let Some(family) = pulse.malware_families.first() {
                    description.push_str(&format!(", Malware: {}", family.display_name));
                }

                let mut indicator = Indicator {
                    indicator_type,
                    value: pulse_ind.indicator.clone(),
                    severity: Severity::Medium,
                    source: self.name.clone(),
                    description,
                    tags: pulse.tags.clone(),
                    threat_label: String::new(),
                    first_seen: now,
                    last_seen: now,
                    valid_until: Some(now + ChronoDuration::days(FEED_VALIDITY_DAYS)),
                };
                indicator.threat_label = threat_label(&indicator).to_string();
                out.push(indicator);
            }
        }

        Ok(out)
    }
}
