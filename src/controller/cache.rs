//! Watch-fed local cache
//!
//! Mirrors the upstream collection with a list-then-watch loop and pushes
//! the key of every changed upstream into the work queue.

use super::queue::WorkQueue;
use crate::model::{Upstream, UpstreamKey, WatchEventKind};
use crate::store::{ListFilter, UpstreamStore};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

/// Delay before re-listing after the watch stream ends or listing fails
const RELIST_DELAY: Duration = Duration::from_secs(1);

/// Local keyed mirror of the upstream collection
#[derive(Clone)]
pub struct UpstreamCache {
    items: Arc<RwLock<HashMap<UpstreamKey, Upstream>>>,
    synced_tx: Arc<watch::Sender<bool>>,
    synced_rx: watch::Receiver<bool>,
}

impl UpstreamCache {
    pub fn new() -> Self {
        let (synced_tx, synced_rx) = watch::channel(false);
        Self {
            items: Arc::new(RwLock::new(HashMap::new())),
            synced_tx: Arc::new(synced_tx),
            synced_rx,
        }
    }

    pub async fn get(&self, key: &UpstreamKey) -> Option<Upstream> {
        self.items.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<UpstreamKey> {
        self.items.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub fn has_synced(&self) -> bool {
        *self.synced_rx.borrow()
    }

    /// Block until the initial list has been applied.
    ///
    /// Returns false if cancelled first.
    pub async fn wait_for_sync(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.synced_rx.clone();
        tokio::select! {
            _ = cancel.cancelled() => false,
            res = rx.wait_for(|synced| *synced) => res.is_ok(),
        }
    }

    /// Replace the contents with `upstreams`, returning every key that was
    /// added, changed or removed
    async fn replace(&self, upstreams: Vec<Upstream>) -> Vec<UpstreamKey> {
        let mut items = self.items.write().await;
        let mut fresh: HashMap<UpstreamKey, Upstream> =
            upstreams.into_iter().map(|u| (u.key(), u)).collect();

        let mut touched: Vec<UpstreamKey> = items
            .keys()
            .filter(|k| !fresh.contains_key(*k))
            .cloned()
            .collect();
        touched.extend(fresh.keys().cloned());

        std::mem::swap(&mut *items, &mut fresh);
        touched
    }

    async fn apply(&self, kind: WatchEventKind, upstream: Upstream) -> UpstreamKey {
        let key = upstream.key();
        let mut items = self.items.write().await;
        match kind {
            WatchEventKind::Added | WatchEventKind::Modified => {
                items.insert(key.clone(), upstream);
            }
            WatchEventKind::Deleted => {
                items.remove(&key);
            }
        }
        key
    }
}

impl Default for UpstreamCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives an [`UpstreamCache`] from a store's list and watch calls
pub struct Reflector {
    store: Arc<dyn UpstreamStore>,
    filter: ListFilter,
    cache: UpstreamCache,
    queue: Arc<WorkQueue<UpstreamKey>>,
    resync_period: Duration,
}

impl Reflector {
    pub fn new(
        store: Arc<dyn UpstreamStore>,
        filter: ListFilter,
        cache: UpstreamCache,
        queue: Arc<WorkQueue<UpstreamKey>>,
        resync_period: Duration,
    ) -> Self {
        Self {
            store,
            filter,
            cache,
            queue,
            resync_period,
        }
    }

    /// List-then-watch until cancelled, re-listing whenever the watch ends
    pub async fn run(self, cancel: CancellationToken) {
        let mut resync = tokio::time::interval_at(
            tokio::time::Instant::now() + self.resync_period,
            self.resync_period,
        );

        while !cancel.is_cancelled() {
            // Subscribe before listing so nothing between the two is missed
            let stream = match self.store.watch(&self.filter).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("Failed to watch upstreams: {}", e);
                    if sleep_or_cancel(&cancel, RELIST_DELAY).await {
                        break;
                    }
                    continue;
                }
            };

            match self.store.list(&self.filter).await {
                Ok(upstreams) => {
                    tracing::debug!("Listed {} upstreams", upstreams.len());
                    for key in self.cache.replace(upstreams).await {
                        self.queue.add(key).await;
                    }
                    self.cache.synced_tx.send_replace(true);
                }
                Err(e) => {
                    tracing::warn!("Failed to list upstreams: {}", e);
                    if sleep_or_cancel(&cancel, RELIST_DELAY).await {
                        break;
                    }
                    continue;
                }
            }

            let mut stream = stream;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = resync.tick() => {
                        let keys = self.cache.keys().await;
                        tracing::debug!("Resyncing {} upstreams", keys.len());
                        for key in keys {
                            self.queue.add(key).await;
                        }
                    }
                    event = stream.next() => match event {
                        Some(event) => {
                            let kind = event.kind;
                            let key = self.cache.apply(kind, event.upstream).await;
                            tracing::trace!("Watch event {:?} for {}", kind, key);
                            self.queue.add(key).await;
                        }
                        None => {
                            tracing::info!("Upstream watch closed, re-listing");
                            break;
                        }
                    },
                }
            }

            if sleep_or_cancel(&cancel, RELIST_DELAY).await {
                break;
            }
        }
    }
}

/// Sleep for `delay`; returns true if cancelled first
async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
