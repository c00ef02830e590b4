//! In-memory upstream store

use super::{ListFilter, UpstreamStore, WatchStream};
use crate::error::StoreError;
use crate::model::{Upstream, UpstreamKey, WatchEvent, WatchEventKind};
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Capacity of the watch broadcast channel
const WATCH_BUFFER: usize = 1024;

/// Upstream store kept in process memory
///
/// Every write bumps a store-wide version counter and publishes a
/// [`WatchEvent`] to all live watchers.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    events: broadcast::Sender<WatchEvent>,
    updates: Arc<AtomicUsize>,
}

struct Inner {
    items: BTreeMap<UpstreamKey, Upstream>,
    version: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            inner: Arc::new(RwLock::new(Inner {
                items: BTreeMap::new(),
                version: 0,
            })),
            events,
            updates: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load a YAML list of upstreams into a fresh store
    pub async fn from_manifest(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read upstream manifest {}", path.display()))?;
        let upstreams: Vec<Upstream> =
            serde_yaml::from_str(&content).context("Failed to parse upstream manifest")?;

        let store = Self::new();
        for upstream in upstreams {
            store.create(upstream).await?;
        }
        Ok(store)
    }

    /// Insert or replace an upstream regardless of its version
    pub async fn create(&self, mut upstream: Upstream) -> Result<Upstream, StoreError> {
        let mut inner = self.inner.write().await;
        inner.version += 1;
        upstream.resource_version = inner.version;
        let kind = if inner.items.contains_key(&upstream.key()) {
            WatchEventKind::Modified
        } else {
            WatchEventKind::Added
        };
        inner.items.insert(upstream.key(), upstream.clone());
        self.publish(kind, upstream.clone());
        Ok(upstream)
    }

    /// Number of successful [`UpstreamStore::update`] calls
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn publish(&self, kind: WatchEventKind, upstream: Upstream) {
        // No receivers is fine; nobody is watching yet
        let _ = self.events.send(WatchEvent::new(kind, upstream));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpstreamStore for MemoryStore {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Upstream>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .items
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect())
    }

    async fn watch(&self, filter: &ListFilter) -> Result<WatchStream, StoreError> {
        let rx = self.events.subscribe();
        let filter = filter.clone();

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Ok(event) => Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Ending the stream makes the watcher re-list
                    tracing::warn!("Watch stream lagged by {} events, closing", n);
                    None
                }
                Err(broadcast::error::RecvError::Closed) => None,
            }
        })
        .filter(move |event| futures::future::ready(filter.matches(&event.upstream)));

        Ok(stream.boxed())
    }

    async fn get(&self, key: &UpstreamKey) -> Result<Option<Upstream>, StoreError> {
        Ok(self.inner.read().await.items.get(key).cloned())
    }

    async fn update(&self, upstream: &Upstream) -> Result<Upstream, StoreError> {
        let key = upstream.key();
        let mut inner = self.inner.write().await;

        let found = match inner.items.get(&key) {
            Some(existing) => existing.resource_version,
            None => return Err(StoreError::NotFound(key)),
        };
        if found != upstream.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: upstream.resource_version,
                found,
            });
        }

        inner.version += 1;
        let mut stored = upstream.clone();
        stored.resource_version = inner.version;
        inner.items.insert(key, stored.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            "Updated upstream {} to version {}",
            stored.key(),
            stored.resource_version
        );
        self.publish(WatchEventKind::Modified, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, key: &UpstreamKey) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.items.remove(key) {
            Some(removed) => {
                inner.version += 1;
                self.publish(WatchEventKind::Deleted, removed);
                Ok(())
            }
            None => Err(StoreError::NotFound(key.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UPSTREAM_TYPE_SERVICE;

    fn upstream(ns: &str, name: &str) -> Upstream {
        Upstream::new(ns, name, UPSTREAM_TYPE_SERVICE)
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(upstream("default", "a")).await.unwrap();

        let first = store.update(&created).await.unwrap();
        assert!(first.resource_version > created.resource_version);

        let err = store.update(&created).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_upstream_is_not_found() {
        let store = MemoryStore::new();
        let err = store.update(&upstream("default", "ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_honours_namespace_filter() {
        let store = MemoryStore::new();
        store.create(upstream("default", "a")).await.unwrap();
        store.create(upstream("other", "b")).await.unwrap();

        let all = store.list(&ListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let scoped = store.list(&ListFilter::namespace("other")).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].name, "b");
    }

    #[tokio::test]
    async fn test_watch_delivers_changes_in_order() {
        let store = MemoryStore::new();
        let mut stream = store.watch(&ListFilter::default()).await.unwrap();

        let created = store.create(upstream("default", "a")).await.unwrap();
        store.update(&created).await.unwrap();
        store.delete(&created.key()).await.unwrap();

        let kinds: Vec<WatchEventKind> = vec![
            stream.next().await.unwrap().kind,
            stream.next().await.unwrap().kind,
            stream.next().await.unwrap().kind,
        ];
        assert_eq!(
            kinds,
            vec![
                WatchEventKind::Added,
                WatchEventKind::Modified,
                WatchEventKind::Deleted
            ]
        );
    }

    #[tokio::test]
    async fn test_watch_skips_other_namespaces() {
        let store = MemoryStore::new();
        let mut stream = store.watch(&ListFilter::namespace("default")).await.unwrap();

        store.create(upstream("other", "x")).await.unwrap();
        store.create(upstream("default", "y")).await.unwrap();

        let event = stream.next().await.unwrap();
        assert_eq!(event.upstream.name, "y");
    }
}
