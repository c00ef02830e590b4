//! Upstream store adapter
//!
//! The discovery engine never talks to a concrete backend directly; it only
//! needs list/watch to mirror the collection and get/update/delete to write
//! discovered functions back.
//!
//! - [`memory`] - In-process store with optimistic concurrency and a
//!   broadcast watch stream

pub mod memory;

use crate::error::StoreError;
use crate::model::{Upstream, UpstreamKey, WatchEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use memory::MemoryStore;

/// Restricts list/watch to a subset of the collection
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only upstreams in this namespace; `None` means all namespaces
    pub namespace: Option<String>,
}

impl ListFilter {
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    pub fn matches(&self, upstream: &Upstream) -> bool {
        self.namespace
            .as_deref()
            .map(|ns| ns == upstream.namespace)
            .unwrap_or(true)
    }
}

/// Stream of changes returned by [`UpstreamStore::watch`]
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// List/Watch/Get/Update/Delete over the upstream collection
#[async_trait]
pub trait UpstreamStore: Send + Sync {
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Upstream>, StoreError>;

    /// Changes made after the call; the stream ends when the store drops it
    async fn watch(&self, filter: &ListFilter) -> Result<WatchStream, StoreError>;

    async fn get(&self, key: &UpstreamKey) -> Result<Option<Upstream>, StoreError>;

    /// Write `upstream`; fails with [`StoreError::Conflict`] if its
    /// `resource_version` is stale
    async fn update(&self, upstream: &Upstream) -> Result<Upstream, StoreError>;

    async fn delete(&self, key: &UpstreamKey) -> Result<(), StoreError>;
}
