//! Indicator lookup service.
//!
//! Resolution order, short-circuiting on first hit: cache, persistent
//! storage, then each configured source in listed order. Source failures
//! are "no opinion", never fatal to the caller. No lock is held across the
//! external calls; concurrent callers may duplicate outbound queries and
//! writes for the same key, which storage tolerates via its
//! (type, value, source) uniqueness.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{label::threat_label, Indicator, IndicatorType, IntelCache, IntelSource, IntelStore};

pub struct IntelService {
    store: Arc<dyn IntelStore>,
    sources: Vec<Arc<dyn IntelSource>>,
    cache: IntelCache,
}

impl IntelService {
    pub fn new(
        store: Arc<dyn IntelStore>,
        sources: Vec<Arc<dyn IntelSource>>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            sources,
            cache: IntelCache::new(cache_ttl),
        }
    }

    /// Resolve an indicator to a verdict. Always returns an indicator: a
    /// value no tier flags comes back as a synthetic benign verdict that is
    /// cached (suppressing repeat external calls within the TTL) but never
    /// persisted.
    pub async fn check(&self, indicator_type: IndicatorType, value: &str) -> Indicator {
        let key = Indicator::lookup_key(indicator_type, value);

        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }

        match self.store.find(indicator_type, value).await {
            Ok(Some(hit)) => {
                self.cache.put(key, hit.clone());
                return hit;
            }
            Ok(None) => {}
            Err(e) => {
                // Storage trouble reads as a miss; sources still get a say.
                warn!(error = %e, key = %key, "intel store lookup failed");
            }
        }

        for source in &self.sources {
            match source.lookup(indicator_type, value).await {
                Ok(Some(mut hit)) => {
                    if hit.threat_label.is_empty() {
                        hit.threat_label = threat_label(&hit).to_string();
                    }
                    if let Err(e) = self.store.upsert(hit.clone()).await {
                        warn!(error = %e, key = %key, "failed to persist intel verdict");
                    }
                    self.cache.put(key, hit.clone());
                    return hit;
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(source = source.name(), error = %e, "intel source query failed");
                    continue;
                }
            }
        }

        debug!(key = %key, "no source flagged indicator, caching benign verdict");
        let benign = Indicator::benign(indicator_type, value);
        self.cache.put(key, benign.clone());
        benign
    }

    pub async fn check_ip(&self, ip: &str) -> Indicator {
        self.check(IndicatorType::Ip, ip).await
    }

    pub async fn check_domain(&self, domain: &str) -> Indicator {
        self.check(IndicatorType::Domain, domain).await
    }

    pub async fn check_hash(&self, hash: &str) -> Indicator {
        self.check(IndicatorType::Hash, hash).await
    }

    pub async fn check_url(&self, url: &str) -> Indicator {
        self.check(IndicatorType::Url, url).await
    }

    /// Drop expired cache entries (driven by the maintenance loop).
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep()
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &IntelCache {
        &self.cache
    }
}
