//! Function discovery for gateway upstreams
//!
//! Watches a collection of upstreams and fills in what each one exposes:
//! Swagger annotations for plain services, Lambda versions for `aws`
//! upstreams and Cloud Functions for `gcf` upstreams.
//!
//! - [`controller`] - Watch-fed cache, work queue and reconciliation workers
//! - [`discovery`] - Strategy trait, registry, Swagger prober, fetcher adapter
//! - [`aws`] - Lambda poller and SigV4 client
//! - [`gcp`] - Cloud Functions fetcher
//! - [`store`] - Upstream store adapter and the in-memory store
//! - [`config`] - YAML configuration

pub mod aws;
pub mod config;
pub mod controller;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod gcp;
pub mod model;
pub mod resolver;
pub mod retry;
pub mod store;

pub use error::{DiscoveryError, StoreError, TransientPolicy};
pub use model::{Function, Upstream, UpstreamKey};
