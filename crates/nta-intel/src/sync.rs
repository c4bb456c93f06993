//! Feed synchronizer.
//!
//! Bulk-pulls indicator feeds from every enabled source into the storage
//! tier. Runs a full sync at startup, then checks hourly whether the
//! current UTC hour matches the configured sync hour. A failure in one
//! source never blocks the others. Each run is capped per source to bound
//! ingestion.

use chrono::{Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{label::threat_label, IntelSource, IntelStore, UpsertOutcome};

pub struct FeedSyncer {
    store: Arc<dyn IntelStore>,
    sources: Vec<Arc<dyn IntelSource>>,
    sync_hour: u32,
    max_rows: usize,
}

/// Per-run ingestion counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub failed_sources: usize,
}

impl FeedSyncer {
    pub fn new(
        store: Arc<dyn IntelStore>,
        sources: Vec<Arc<dyn IntelSource>>,
        sync_hour: u32,
        max_rows: usize,
    ) -> Self {
        Self {
            store,
            sources,
            sync_hour,
            max_rows,
        }
    }

    /// Startup sync followed by the hourly schedule check. Exits when the
    /// shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("starting threat intelligence feed syncer");
        self.sync_now().await;

        let mut tick = tokio::time::interval(Duration::from_secs(3600));
        tick.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("feed syncer stopped");
                        return;
                    }
                }
                _ = tick.tick() => {
                    if Utc::now().hour() == self.sync_hour {
                        self.sync_now().await;
                    }
                }
            }
        }
    }

    /// One full sync across all sources.
    pub async fn sync_now(&self) -> SyncReport {
        info!("starting threat intelligence feed synchronization");
        let mut report = SyncReport::default();

        for source in &self.sources {
            match self.sync_source(source.as_ref()).await {
                Ok((added, updated)) => {
                    info!(
                        source = source.name(),
                        added, updated, "feed sync completed"
                    );
                    report.added += added;
                    report.updated += updated;
                }
                Err(e) => {
                    error!(source = source.name(), error = %e, "feed sync failed");
                    report.failed_sources += 1;
                }
            }
        }

        info!(
            added = report.added,
            updated = report.updated,
            failed_sources = report.failed_sources,
            "feed sync run finished"
        );
        report
    }

    async fn sync_source(
        &self,
        source: &dyn IntelSource,
    ) -> Result<(usize, usize), crate::IntelError> {
        let indicators = source.bulk_fetch().await?;

        let mut added = 0;
        let mut updated = 0;

        for mut indicator in indicators {
            if indicator.threat_label.is_empty() {
                indicator.threat_label = threat_label(&indicator).to_string();
            }

            let value = indicator.value.clone();
            match self.store.upsert(indicator).await {
                Ok(UpsertOutcome::Inserted) => added += 1,
                Ok(UpsertOutcome::Updated) => updated += 1,
                Err(e) => {
                    warn!(source = source.name(), value = %value, error = %e, "failed to upsert indicator");
                }
            }

            if added + updated >= self.max_rows {
                warn!(
                    source = source.name(),
                    cap = self.max_rows,
                    "ingestion cap reached, stopping this source's run"
                );
                break;
            }
        }

        Ok((added, updated))
    }
}
