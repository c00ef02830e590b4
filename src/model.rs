//! Upstream data model
//!
//! Types shared by the store, the watcher and every discovery strategy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Upstream type served by plain host:port lists
pub const UPSTREAM_TYPE_SERVICE: &str = "service";
/// Upstream type backed by a Kubernetes service
pub const UPSTREAM_TYPE_KUBERNETES: &str = "kubernetes";
/// Upstream type for AWS Lambda regions
pub const UPSTREAM_TYPE_AWS: &str = "aws";
/// Upstream type for Google Cloud Functions projects
pub const UPSTREAM_TYPE_GCF: &str = "gcf";

/// Annotation recording the detected service type
pub const ANNOTATION_SERVICE_TYPE: &str = "functions.gateway.io/service_type";
/// Annotation recording where the Swagger document was found
pub const ANNOTATION_SWAGGER_URL: &str = "functions.gateway.io/swagger_url";
/// Value of [`ANNOTATION_SERVICE_TYPE`] for Swagger services
pub const SERVICE_TYPE_SWAGGER: &str = "swagger";

/// Namespaced identity of an upstream (`namespace/name`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UpstreamKey {
    pub namespace: String,
    pub name: String,
}

impl UpstreamKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for UpstreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for UpstreamKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(anyhow::anyhow!("Invalid upstream key: {}", s)),
        }
    }
}

/// One invocable unit exposed by an upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub spec: Map<String, Value>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: Map::new(),
        }
    }

    /// Builder-style helper to attach a spec entry
    pub fn with_spec(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.spec.insert(key.to_string(), value.into());
        self
    }
}

/// A registered backend service whose functions the gateway needs to know about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "type")]
    pub upstream_type: String,
    #[serde(default)]
    pub spec: Map<String, Value>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Assigned by the store; an update must carry the version it read
    #[serde(default)]
    pub resource_version: u64,
}

impl Upstream {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        upstream_type: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            upstream_type: upstream_type.into(),
            spec: Map::new(),
            functions: Vec::new(),
            annotations: BTreeMap::new(),
            resource_version: 0,
        }
    }

    pub fn key(&self) -> UpstreamKey {
        UpstreamKey::new(&self.namespace, &self.name)
    }

    /// String value of a spec field, if present and a string
    pub fn spec_str(&self, field: &str) -> Option<&str> {
        self.spec.get(field).and_then(|v| v.as_str())
    }

    pub fn with_spec(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.spec.insert(key.to_string(), value.into());
        self
    }

    pub fn with_functions(mut self, functions: Vec<Function>) -> Self {
        self.functions = functions;
        self
    }

    /// Whether Swagger discovery already succeeded for this upstream
    pub fn is_swagger(&self) -> bool {
        self.annotations
            .get(ANNOTATION_SERVICE_TYPE)
            .map(|v| v == SERVICE_TYPE_SWAGGER)
            .unwrap_or(false)
    }
}

/// Kind of change delivered by a watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// A single change observed on the upstream collection
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub upstream: Upstream,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, upstream: Upstream) -> Self {
        Self { kind, upstream }
    }
}
