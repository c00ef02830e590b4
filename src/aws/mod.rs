//! AWS Lambda discovery
//!
//! Lambda upstreams are handled by a stateful [`Poller`] rather than on each
//! reconciliation: reconciling an `aws` upstream only registers (or refreshes)
//! its region with the poller, and the poller's own timer decides when the
//! upstream's function list needs rewriting.
//!
//! # Module Structure
//!
//! - [`credentials`] - Access keys from the process environment
//! - [`http`] - SigV4-signed Lambda `ListFunctions` client
//! - [`poller`] - Per-region state and the periodic diff/update loop
//! - [`discovery`] - Glue between upstreams, the poller and the store

pub mod credentials;
pub mod discovery;
pub mod http;
pub mod poller;

use crate::diff::Identity;
use async_trait::async_trait;
use std::fmt;

pub use credentials::AccessToken;
pub use discovery::{AwsDiscovery, StoreRegionUpdater};
pub use http::LambdaClient;
pub use poller::Poller;

/// An AWS region and the Lambdas last recorded for it
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Key of the owning upstream (`namespace/name`)
    pub id: String,
    /// AWS region name, e.g. `us-east-1`
    pub name: String,
    pub token: AccessToken,
    pub lambdas: Vec<Lambda>,
}

/// A Lambda function; each qualifier is treated as a separate Lambda
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lambda {
    pub name: String,
    pub qualifier: String,
}

impl Lambda {
    pub fn new(name: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: qualifier.into(),
        }
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.qualifier)
    }
}

impl Identity for Lambda {
    fn identity(&self) -> String {
        self.to_string()
    }
}

/// Gets the Lambdas for a region
#[async_trait]
pub trait LambdaFetcher: Send + Sync {
    async fn fetch(&self, region: &str, token: &AccessToken) -> anyhow::Result<Vec<Lambda>>;
}

/// Persists a region's new Lambda list, e.g. into its upstream
#[async_trait]
pub trait RegionUpdater: Send + Sync {
    async fn update(&self, region: &Region) -> anyhow::Result<()>;
}
