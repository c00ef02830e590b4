//! Discovery strategies
//!
//! A strategy decides whether (and which) functions an upstream exposes.
//! Strategies are registered with a [`Registry`], which runs every strategy
//! whose capability predicates accept an upstream.
//!
//! - [`registry`] - Strategy registration and dispatch
//! - [`swagger`] - HTTP probing for Swagger documents
//! - [`fetcher`] - Adapter turning a stateless [`FunctionFetcher`] into a strategy

pub mod fetcher;
pub mod registry;
pub mod swagger;

use crate::error::DiscoveryError;
use crate::model::{Function, Upstream, UpstreamKey};
use async_trait::async_trait;

pub use fetcher::FetcherDiscovery;
pub use registry::{Dispatch, Registry};
pub use swagger::SwaggerDiscovery;

/// What a strategy concluded about one upstream
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing to write back
    Unchanged,
    /// The upstream as it should be stored
    Updated(Upstream),
}

/// A backend-specific discovery algorithm
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this strategy handles the upstream's declared type
    fn supports(&self, upstream: &Upstream) -> bool;

    /// Whether this strategy's marker is already present on the upstream
    fn is_discovered(&self, _upstream: &Upstream) -> bool {
        false
    }

    /// Whether the upstream was permanently given up on
    fn is_skipped(&self, _upstream: &Upstream) -> bool {
        false
    }

    async fn discover(&self, upstream: &Upstream) -> Result<Outcome, DiscoveryError>;

    /// Drop any state held for an upstream that no longer exists
    async fn release(&self, _key: &UpstreamKey) {}
}

/// Lists the current functions of an upstream without keeping state
#[async_trait]
pub trait FunctionFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_fetch(&self, upstream: &Upstream) -> bool;

    async fn fetch(&self, upstream: &Upstream) -> anyhow::Result<Vec<Function>>;
}
