//! Upstream address resolution
//!
//! Turns an upstream into a `host:port` string that can be probed over HTTP.

use crate::model::{Upstream, UPSTREAM_TYPE_KUBERNETES, UPSTREAM_TYPE_SERVICE};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Cluster DNS suffix for Kubernetes services
const CLUSTER_DOMAIN: &str = "svc.cluster.local";

#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// `Ok(None)` means the upstream has no usable address right now
    async fn resolve(&self, upstream: &Upstream) -> Result<Option<String>>;
}

/// Resolves addresses from the upstream spec alone
///
/// - `service`: first entry of `spec.hosts` (`addr` + `port`)
/// - `kubernetes`: `service_name.service_namespace.svc.cluster.local:service_port`
#[derive(Debug, Clone, Default)]
pub struct SpecResolver;

#[async_trait]
impl AddressResolver for SpecResolver {
    async fn resolve(&self, upstream: &Upstream) -> Result<Option<String>> {
        match upstream.upstream_type.as_str() {
            UPSTREAM_TYPE_SERVICE => resolve_service(upstream),
            UPSTREAM_TYPE_KUBERNETES => resolve_kubernetes(upstream),
            _ => Ok(None),
        }
    }
}

fn resolve_service(upstream: &Upstream) -> Result<Option<String>> {
    let Some(hosts) = upstream.spec.get("hosts") else {
        return Ok(None);
    };
    let hosts = hosts
        .as_array()
        .ok_or_else(|| anyhow!("spec.hosts of {} is not a list", upstream.key()))?;
    let Some(host) = hosts.first() else {
        return Ok(None);
    };

    let addr = host
        .get("addr")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("host entry of {} has no addr", upstream.key()))?;
    let port = port_of(host.get("port"))
        .ok_or_else(|| anyhow!("host entry of {} has no valid port", upstream.key()))?;

    Ok(Some(format!("{}:{}", addr, port)))
}

fn resolve_kubernetes(upstream: &Upstream) -> Result<Option<String>> {
    let Some(service) = upstream.spec_str("service_name") else {
        return Ok(None);
    };
    let namespace = upstream
        .spec_str("service_namespace")
        .unwrap_or(&upstream.namespace);
    let port = match upstream.spec.get("service_port") {
        None => 80,
        Some(v) => port_of(Some(v))
            .ok_or_else(|| anyhow!("service_port of {} is not a valid port", upstream.key()))?,
    };

    Ok(Some(format!(
        "{}.{}.{}:{}",
        service, namespace, CLUSTER_DOMAIN, port
    )))
}

/// Accepts numeric or string ports
fn port_of(value: Option<&Value>) -> Option<u16> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
