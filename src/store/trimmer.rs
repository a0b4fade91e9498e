//! Purges wait entries written in an older schema

use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::store::WaitEntryStore;
use crate::types::{ConnectionId, WaitEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Deletes every entry whose schema version is behind the current one
pub struct SchemaTrimmer {
    store: Arc<dyn WaitEntryStore>,
    metrics_collector: Option<Arc<MetricsCollector>>,
}

impl SchemaTrimmer {
    pub fn new(store: Arc<dyn WaitEntryStore>) -> Self {
        Self {
            store,
            metrics_collector: None,
        }
    }

    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    /// Run one trimming pass, returning how many entries were removed
    pub async fn trim_stale(&self) -> Result<usize> {
        info!("Trimming stale wait entries...");

        let stale = self.store.query(&|entry: &WaitEntry| entry.is_stale()).await?;
        if stale.is_empty() {
            debug!("No stale wait entries found");
            return Ok(0);
        }

        let ids: Vec<ConnectionId> = stale.into_iter().map(|entry| entry.id).collect();
        let trimmed = self.store.delete_many(&ids).await?;

        if let Some(metrics) = &self.metrics_collector {
            metrics.record_trimmed(trimmed);
        }

        info!(
            "Trimmed {} of {} stale wait entries",
            trimmed,
            ids.len()
        );
        Ok(trimmed)
    }

    /// Trim once now and then on every tick of `every`
    pub fn start_trim_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut trim_interval = interval(every);
            info!("Schema trim task started ({}s interval)", every.as_secs());

            loop {
                trim_interval.tick().await;

                if let Err(e) = self.trim_stale().await {
                    error!("Error during schema trimming: {}", e);
                }
            }
        })
    }
}
