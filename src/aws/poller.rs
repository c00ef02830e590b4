//! Lambda poller
//!
//! Keeps the last committed Lambda list per region and rewrites a region's
//! upstream only when a poll finds a different set. The repository is only
//! mutated after the updater succeeds, so a failed write is retried on the
//! next tick instead of being mistaken for a no-op.

use super::{LambdaFetcher, Region, RegionUpdater};
use crate::diff;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Poller {
    repo: RwLock<HashMap<String, Region>>,
    fetcher: Arc<dyn LambdaFetcher>,
    updater: Arc<dyn RegionUpdater>,
}

impl Poller {
    pub fn new(fetcher: Arc<dyn LambdaFetcher>, updater: Arc<dyn RegionUpdater>) -> Self {
        Self {
            repo: RwLock::new(HashMap::new()),
            fetcher,
            updater,
        }
    }

    /// Track `region`, keeping the Lambdas already known for it
    pub async fn add_update_region(&self, mut region: Region) {
        let mut repo = self.repo.write().await;
        if let Some(existing) = repo.get(&region.id) {
            region.lambdas = existing.lambdas.clone();
        } else {
            tracing::info!("Tracking lambdas for {} in {}", region.id, region.name);
        }
        repo.insert(region.id.clone(), region);
    }

    pub async fn remove_region(&self, id: &str) {
        if self.repo.write().await.remove(id).is_some() {
            tracing::info!("Stopped tracking lambdas for {}", id);
        }
    }

    pub async fn region(&self, id: &str) -> Option<Region> {
        self.repo.read().await.get(id).cloned()
    }

    pub async fn region_count(&self) -> usize {
        self.repo.read().await.len()
    }

    /// Poll every `period` until cancelled; the first poll runs immediately
    pub fn start(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => poller.poll_once().await,
                }
            }
            tracing::debug!("Lambda poller stopped");
        })
    }

    /// Fetch, diff and update each tracked region once
    pub async fn poll_once(&self) {
        let regions: Vec<Region> = self.repo.read().await.values().cloned().collect();

        for region in regions {
            let lambdas = match self.fetcher.fetch(&region.name, &region.token).await {
                Ok(lambdas) => lambdas,
                Err(e) => {
                    tracing::warn!("Unable to get lambdas for {}: {:#}", region.id, e);
                    continue;
                }
            };

            if !diff::changed(&region.lambdas, &lambdas) {
                continue;
            }

            let updated = Region {
                lambdas,
                ..region
            };
            if let Err(e) = self.updater.update(&updated).await {
                tracing::warn!(
                    "Unable to update change in lambdas for {}: {:#}",
                    updated.id,
                    e
                );
                continue;
            }

            // Region may have been removed or refreshed while we were polling
            if let Some(entry) = self.repo.write().await.get_mut(&updated.id) {
                entry.lambdas = updated.lambdas;
            }
        }
    }
}
