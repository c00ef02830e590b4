//! Swagger discovery
//!
//! Probes `service` and `kubernetes` upstreams for a Swagger document and
//! annotates the ones that serve one. Upstreams that fail for a non-transient
//! reason are remembered in a skip-cache and never probed again by this
//! instance.

use super::{Discovery, Outcome};
use crate::error::{DiscoveryError, TransientPolicy};
use crate::model::{
    Upstream, UpstreamKey, ANNOTATION_SERVICE_TYPE, ANNOTATION_SWAGGER_URL, SERVICE_TYPE_SWAGGER,
    UPSTREAM_TYPE_KUBERNETES, UPSTREAM_TYPE_SERVICE,
};
use crate::resolver::AddressResolver;
use crate::retry::with_retries;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Paths tried after the caller-supplied ones
pub const COMMON_SWAGGER_URIS: &[&str] = &[
    "/swagger.json",
    "/swagger/docs/v1",
    "/swagger/docs/v2",
    "/v1/swagger",
];

/// Upstreams this instance has given up on; entries are never removed
#[derive(Debug, Default)]
pub struct SkipCache {
    skipped: RwLock<HashSet<UpstreamKey>>,
}

impl SkipCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &UpstreamKey) -> bool {
        self.skipped
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn insert(&self, key: UpstreamKey) {
        self.skipped
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
    }

    pub fn len(&self) -> usize {
        self.skipped.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SwaggerDiscovery {
    http: Client,
    resolver: Arc<dyn AddressResolver>,
    candidate_uris: Vec<String>,
    retries: u32,
    policy: TransientPolicy,
    skip: SkipCache,
}

impl SwaggerDiscovery {
    pub fn new(
        http: Client,
        resolver: Arc<dyn AddressResolver>,
        candidate_uris: Vec<String>,
        retries: u32,
        policy: TransientPolicy,
    ) -> Self {
        Self {
            http,
            resolver,
            candidate_uris,
            retries,
            policy,
            skip: SkipCache::new(),
        }
    }

    pub fn skip_cache(&self) -> &SkipCache {
        &self.skip
    }

    /// Candidate URIs followed by the built-in defaults
    fn uris(&self) -> impl Iterator<Item = &str> {
        self.candidate_uris
            .iter()
            .map(String::as_str)
            .chain(COMMON_SWAGGER_URIS.iter().copied())
    }

    /// One discovery attempt; `Ok(None)` when the upstream is not Swagger
    async fn probe(&self, upstream: &Upstream) -> Result<Option<String>, DiscoveryError> {
        let addr = self
            .resolver
            .resolve(upstream)
            .await
            .map_err(|e| DiscoveryError::resolve(upstream.key(), e))?;
        let Some(addr) = addr.filter(|a| !a.is_empty()) else {
            tracing::debug!("No address for {}, skipping swagger probe", upstream.key());
            return Ok(None);
        };

        for uri in self.uris() {
            let url = format!("http://{}{}", addr, uri);
            tracing::debug!("Querying swagger url {}", url);

            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|source| DiscoveryError::Probe {
                    addr: addr.clone(),
                    source,
                })?;

            if response.status() == StatusCode::OK {
                return Ok(Some(url));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl Discovery for SwaggerDiscovery {
    fn name(&self) -> &'static str {
        "swagger"
    }

    fn supports(&self, upstream: &Upstream) -> bool {
        matches!(
            upstream.upstream_type.as_str(),
            UPSTREAM_TYPE_KUBERNETES | UPSTREAM_TYPE_SERVICE
        )
    }

    fn is_discovered(&self, upstream: &Upstream) -> bool {
        upstream.is_swagger()
    }

    fn is_skipped(&self, upstream: &Upstream) -> bool {
        self.skip.contains(&upstream.key())
    }

    async fn discover(&self, upstream: &Upstream) -> Result<Outcome, DiscoveryError> {
        tracing::debug!("Initiating swagger detection for {}", upstream.key());

        match with_retries(self.retries, move || self.probe(upstream)).await {
            Ok(Some(url)) => {
                tracing::info!("Swagger service detected: {}", url);
                let mut updated = upstream.clone();
                updated
                    .annotations
                    .insert(ANNOTATION_SERVICE_TYPE.to_string(), SERVICE_TYPE_SWAGGER.to_string());
                updated
                    .annotations
                    .insert(ANNOTATION_SWAGGER_URL.to_string(), url);
                Ok(Outcome::Updated(updated))
            }
            Ok(None) => Ok(Outcome::Unchanged),
            Err(e) if e.is_transient(self.policy) => {
                tracing::warn!(
                    "Transient failure probing {} for swagger, will retry: {}",
                    upstream.key(),
                    e
                );
                Err(e)
            }
            Err(e) => {
                self.skip.insert(upstream.key());
                tracing::warn!(
                    "Unable to discover whether upstream {} implements swagger: {:#}",
                    upstream.key(),
                    anyhow::Error::from(e)
                );
                Ok(Outcome::Unchanged)
            }
        }
    }
}
