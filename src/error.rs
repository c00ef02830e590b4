//! Error types for store access and discovery

use crate::model::UpstreamKey;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Errors returned by an upstream store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upstream {0} not found")]
    NotFound(UpstreamKey),

    /// Write carried a stale resource version
    #[error("conflict updating upstream {key}: expected version {expected}, found {found}")]
    Conflict {
        key: UpstreamKey,
        expected: u64,
        found: u64,
    },

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Errors produced while discovering functions for an upstream
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("unable to resolve address for upstream {upstream}")]
    Resolve {
        upstream: UpstreamKey,
        #[source]
        source: anyhow::Error,
    },

    #[error("could not perform HTTP GET on resolved addr {addr}")]
    Probe {
        addr: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to fetch functions for upstream {upstream}")]
    Fetch {
        upstream: UpstreamKey,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DiscoveryError {
    pub fn resolve(upstream: UpstreamKey, source: anyhow::Error) -> Self {
        Self::Resolve { upstream, source }
    }

    pub fn fetch(upstream: UpstreamKey, source: anyhow::Error) -> Self {
        Self::Fetch { upstream, source }
    }

    /// Whether a later attempt may reasonably succeed under `policy`
    pub fn is_transient(&self, policy: TransientPolicy) -> bool {
        match self {
            // Stale writes resolve on the next read
            Self::Store(StoreError::Conflict { .. }) => true,
            _ => is_transient_network(self, policy),
        }
    }
}

/// Which network failures count as transient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransientPolicy {
    /// Only routing failures (host or network unreachable)
    #[default]
    RouteOnly,
    /// Routing failures plus refused/reset connections and timeouts
    Network,
}

impl TransientPolicy {
    fn matches_io(self, kind: io::ErrorKind) -> bool {
        let route = matches!(
            kind,
            io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable
        );
        match self {
            Self::RouteOnly => route,
            Self::Network => {
                route
                    || matches!(
                        kind,
                        io::ErrorKind::ConnectionRefused
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::TimedOut
                    )
            }
        }
    }
}

/// Walk the source chain looking for a transient network condition
pub fn is_transient_network(err: &(dyn StdError + 'static), policy: TransientPolicy) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if policy.matches_io(io_err.kind()) {
                return true;
            }
        }
        if let Some(req_err) = e.downcast_ref::<reqwest::Error>() {
            if policy == TransientPolicy::Network && req_err.is_timeout() {
                return true;
            }
        }
        // Some resolvers only surface the OS message
        if e.to_string().to_lowercase().contains("no route to host") {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_err(kind: io::ErrorKind) -> DiscoveryError {
        DiscoveryError::fetch(
            UpstreamKey::new("default", "svc"),
            anyhow::Error::new(io::Error::new(kind, "boom")),
        )
    }

    #[test]
    fn test_route_failures_are_transient_under_both_policies() {
        for policy in [TransientPolicy::RouteOnly, TransientPolicy::Network] {
            assert!(fetch_err(io::ErrorKind::HostUnreachable).is_transient(policy));
            assert!(fetch_err(io::ErrorKind::NetworkUnreachable).is_transient(policy));
        }
    }

    #[test]
    fn test_connection_refused_depends_on_policy() {
        let err = fetch_err(io::ErrorKind::ConnectionRefused);
        assert!(!err.is_transient(TransientPolicy::RouteOnly));
        assert!(err.is_transient(TransientPolicy::Network));
    }

    #[test]
    fn test_message_fallback_matches_route_failure() {
        let err = DiscoveryError::resolve(
            UpstreamKey::new("default", "svc"),
            anyhow::anyhow!("dial tcp 10.0.0.1:80: getsockopt: no route to host"),
        );
        assert!(err.is_transient(TransientPolicy::RouteOnly));
    }

    #[test]
    fn test_conflict_is_transient_and_not_found_is_not() {
        let key = UpstreamKey::new("default", "svc");
        let conflict = DiscoveryError::Store(StoreError::Conflict {
            key: key.clone(),
            expected: 1,
            found: 2,
        });
        assert!(conflict.is_transient(TransientPolicy::RouteOnly));
        let missing = DiscoveryError::Store(StoreError::NotFound(key));
        assert!(!missing.is_transient(TransientPolicy::Network));
    }
}
