//! Discovery Registry
//!
//! Holds the strategies of one engine instance and selects which of them run
//! for a given upstream.

use super::{Discovery, Outcome};
use crate::error::DiscoveryError;
use crate::model::{Upstream, UpstreamKey};
use std::sync::Arc;

/// Result of running every eligible strategy against one upstream
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Upstream with all strategy changes applied, if any strategy changed it
    pub updated: Option<Upstream>,
    /// First error raised by a strategy
    pub error: Option<DiscoveryError>,
    /// Names of the strategies that ran
    pub ran: Vec<&'static str>,
}

#[derive(Default, Clone)]
pub struct Registry {
    strategies: Vec<Arc<dyn Discovery>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Arc<dyn Discovery>) {
        tracing::info!("Registered discovery strategy: {}", strategy.name());
        self.strategies.push(strategy);
    }

    pub fn with(mut self, strategy: Arc<dyn Discovery>) -> Self {
        self.register(strategy);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Type supported, not yet discovered, not skipped; in that order
    pub fn should_try(strategy: &dyn Discovery, upstream: &Upstream) -> bool {
        strategy.supports(upstream)
            && !strategy.is_discovered(upstream)
            && !strategy.is_skipped(upstream)
    }

    /// Run every eligible strategy, composing their changes.
    ///
    /// A failing strategy does not stop the others.
    pub async fn dispatch(&self, upstream: &Upstream) -> Dispatch {
        let mut current = upstream.clone();
        let mut changed = false;
        let mut dispatch = Dispatch::default();

        for strategy in &self.strategies {
            if !Self::should_try(strategy.as_ref(), &current) {
                continue;
            }
            tracing::debug!("Running {} discovery for {}", strategy.name(), current.key());
            dispatch.ran.push(strategy.name());

            match strategy.discover(&current).await {
                Ok(Outcome::Updated(next)) => {
                    current = next;
                    changed = true;
                }
                Ok(Outcome::Unchanged) => {}
                Err(e) => {
                    tracing::debug!("{} discovery failed for {}: {}", strategy.name(), current.key(), e);
                    if dispatch.error.is_none() {
                        dispatch.error = Some(e);
                    }
                }
            }
        }

        if changed {
            dispatch.updated = Some(current);
        }
        dispatch
    }

    /// Tell every strategy an upstream is gone
    pub async fn release(&self, key: &UpstreamKey) {
        for strategy in &self.strategies {
            strategy.release(key).await;
        }
    }
}
