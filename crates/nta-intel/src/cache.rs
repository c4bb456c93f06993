//! In-memory TTL cache for lookup verdicts.
//!
//! Entries are lazily evicted by the periodic sweep and eagerly overwritten
//! on every successful lookup. Expired entries read as misses.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

use crate::Indicator;

struct CacheEntry {
    indicator: Indicator,
    expires_at: DateTime<Utc>,
}

/// Verdict cache keyed by `"type:value"` with a fixed TTL.
pub struct IntelCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: ChronoDuration,
}

impl IntelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1)),
        }
    }

    /// Fetch a live entry; expired entries are treated as misses.
    pub fn get(&self, key: &str) -> Option<Indicator> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if Utc::now() > entry.expires_at {
            return None;
        }
        Some(entry.indicator.clone())
    }

    /// Insert or overwrite, stamping a fresh expiry.
    pub fn put(&self, key: impl Into<String>, indicator: Indicator) {
        self.put_at(key, indicator, Utc::now() + self.ttl);
    }

    pub(crate) fn put_at(
        &self,
        key: impl Into<String>,
        indicator: Indicator,
        expires_at: DateTime<Utc>,
    ) {
        self.entries.write().insert(
            key.into(),
            CacheEntry {
                indicator,
                expires_at,
            },
        );
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
