//! Stateless fetcher strategy
//!
//! Wraps a [`FunctionFetcher`] so it can be registered as a discovery
//! strategy. The upstream's own function list is the last-known state: the
//! strategy only produces an update when the fetched set differs from it.

use super::{Discovery, FunctionFetcher, Outcome};
use crate::diff;
use crate::error::DiscoveryError;
use crate::model::Upstream;
use async_trait::async_trait;
use std::sync::Arc;

pub struct FetcherDiscovery {
    fetcher: Arc<dyn FunctionFetcher>,
}

impl FetcherDiscovery {
    pub fn new(fetcher: Arc<dyn FunctionFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Discovery for FetcherDiscovery {
    fn name(&self) -> &'static str {
        self.fetcher.name()
    }

    fn supports(&self, upstream: &Upstream) -> bool {
        self.fetcher.can_fetch(upstream)
    }

    async fn discover(&self, upstream: &Upstream) -> Result<Outcome, DiscoveryError> {
        let functions = self
            .fetcher
            .fetch(upstream)
            .await
            .map_err(|e| DiscoveryError::fetch(upstream.key(), e))?;

        if !diff::changed(&upstream.functions, &functions) {
            tracing::debug!("No function changes for {}", upstream.key());
            return Ok(Outcome::Unchanged);
        }

        tracing::info!(
            "Functions changed for {}: {} -> {}",
            upstream.key(),
            upstream.functions.len(),
            functions.len()
        );
        let mut updated = upstream.clone();
        updated.functions = functions;
        Ok(Outcome::Updated(updated))
    }
}
