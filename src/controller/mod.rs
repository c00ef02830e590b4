//! Reconciliation controller
//!
//! A [`Reflector`] mirrors the upstream store into an [`UpstreamCache`] and
//! feeds changed keys into a [`WorkQueue`]. Workers take keys off the queue,
//! run the discovery [`Registry`] against the cached upstream and write any
//! changes back with a single store update.
//!
//! Failed keys are requeued with per-key exponential backoff until they have
//! been requeued `max_retries` times, after which the error is handed to an
//! [`ErrorSink`] and the key is forgotten.
//!
//! - [`cache`] - Watch-fed cache and the reflector that drives it
//! - [`queue`] - Deduplicating, rate-limited work queue

pub mod cache;
pub mod queue;

pub use cache::{Reflector, UpstreamCache};
pub use queue::{Backoff, WorkQueue};

use crate::discovery::Registry;
use crate::error::DiscoveryError;
use crate::model::UpstreamKey;
use crate::store::{ListFilter, UpstreamStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Receives errors for keys that exhausted their retries
pub trait ErrorSink: Send + Sync {
    fn report(&self, key: &UpstreamKey, err: &DiscoveryError);
}

/// Reports abandoned keys at error level
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, key: &UpstreamKey, err: &DiscoveryError) {
        tracing::error!("Dropping upstream {} out of the queue: {}", key, err);
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub filter: ListFilter,
    pub workers: usize,
    pub max_retries: u32,
    pub resync_period: Duration,
    pub backoff: Backoff,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            filter: ListFilter::default(),
            workers: 2,
            max_retries: 5,
            resync_period: Duration::from_secs(300),
            backoff: Backoff::default(),
        }
    }
}

pub struct Controller {
    store: Arc<dyn UpstreamStore>,
    registry: Arc<Registry>,
    cache: UpstreamCache,
    queue: Arc<WorkQueue<UpstreamKey>>,
    sink: Arc<dyn ErrorSink>,
    options: ControllerOptions,
}

impl Controller {
    pub fn new(store: Arc<dyn UpstreamStore>, registry: Registry, options: ControllerOptions) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
            cache: UpstreamCache::new(),
            queue: WorkQueue::new(options.backoff),
            sink: Arc::new(LogSink),
            options,
        }
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn cache(&self) -> &UpstreamCache {
        &self.cache
    }

    /// Run until `cancel` fires, then drain workers and return
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let reflector = Reflector::new(
            Arc::clone(&self.store),
            self.options.filter.clone(),
            self.cache.clone(),
            Arc::clone(&self.queue),
            self.options.resync_period,
        );
        let reflector = tokio::spawn(reflector.run(cancel.clone()));

        tracing::info!("Waiting for upstream cache to sync");
        if !self.cache.wait_for_sync(&cancel).await {
            tracing::info!("Cancelled before cache sync");
            self.queue.shut_down().await;
            if let Err(e) = reflector.await {
                tracing::warn!("Reflector task failed: {}", e);
            }
            return;
        }

        tracing::info!(
            "Starting {} workers with {} discovery strategies",
            self.options.workers,
            self.registry.len()
        );
        let workers: Vec<_> = (0..self.options.workers.max(1))
            .map(|_| {
                let controller = Arc::clone(&self);
                tokio::spawn(async move { while controller.process_next_item().await {} })
            })
            .collect();

        cancel.cancelled().await;
        tracing::info!("Shutting down controller");
        self.queue.shut_down().await;

        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("Worker task failed: {}", e);
            }
        }
        if let Err(e) = reflector.await {
            tracing::warn!("Reflector task failed: {}", e);
        }
    }

    /// Process one key; false once the queue has shut down
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let result = self.process_item(&key).await;
        self.handle_result(&key, result).await;
        self.queue.done(&key).await;
        true
    }

    async fn process_item(&self, key: &UpstreamKey) -> Result<(), DiscoveryError> {
        let Some(upstream) = self.cache.get(key).await else {
            tracing::debug!("Upstream {} no longer exists, releasing", key);
            self.registry.release(key).await;
            return Ok(());
        };

        let dispatch = self.registry.dispatch(&upstream).await;

        if let Some(updated) = dispatch.updated {
            tracing::info!("Updating upstream {} after {:?}", key, dispatch.ran);
            self.store.update(&updated).await?;
        }

        match dispatch.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn handle_result(&self, key: &UpstreamKey, result: Result<(), DiscoveryError>) {
        let Err(err) = result else {
            self.queue.forget(key).await;
            return;
        };

        let requeues = self.queue.num_requeues(key).await;
        if requeues < self.options.max_retries {
            tracing::info!("Error processing upstream {} (attempt {}): {}", key, requeues + 1, err);
            self.queue.add_rate_limited(key.clone()).await;
            return;
        }

        self.queue.forget(key).await;
        self.sink.report(key, &err);
    }
}
