//! Google Cloud Functions fetcher

use super::client::GcpClient;
use crate::discovery::FunctionFetcher;
use crate::model::{Function, Upstream, UPSTREAM_TYPE_GCF};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Spec field naming the GCP project of a `gcf` upstream
pub const SPEC_PROJECT: &str = "project";

/// Functions still deploying are picked up on a later reconciliation
const STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFunctionsResponse {
    #[serde(default)]
    functions: Vec<CloudFunction>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudFunction {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    version_id: Option<Value>,
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(default)]
    https_trigger: Option<HttpsTrigger>,
    #[serde(default)]
    event_trigger: Option<EventTrigger>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpsTrigger {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTrigger {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    resource: String,
    #[serde(default)]
    service: String,
}

impl CloudFunction {
    fn trigger(&self) -> Value {
        match (&self.https_trigger, &self.event_trigger) {
            (Some(http), _) => json!({ "Type": "HTTP", "URL": http.url }),
            (None, Some(event)) => json!({
                "Type": "Event",
                "Event": event.event_type,
                "Resource": event.resource,
                "Service": event.service,
            }),
            (None, None) => json!({ "Type": "Event" }),
        }
    }

    fn into_function(self) -> Function {
        // versionId is an int64, which the API encodes as a string
        let version = match &self.version_id {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let trigger = self.trigger();
        Function::new(self.name)
            .with_spec("Version", version)
            .with_spec("Entry", self.entry_point.unwrap_or_default())
            .with_spec("Trigger", trigger)
    }
}

/// Lists the active functions of a `gcf` upstream's project
pub struct GcfFetcher {
    client: GcpClient,
    default_project: Option<String>,
}

impl GcfFetcher {
    pub fn new(client: GcpClient, default_project: Option<String>) -> Self {
        Self {
            client,
            default_project,
        }
    }

    fn project<'a>(&'a self, upstream: &'a Upstream) -> Result<&'a str> {
        upstream
            .spec_str(SPEC_PROJECT)
            .or(self.default_project.as_deref())
            .ok_or_else(|| anyhow!("upstream {} has no spec.{}", upstream.key(), SPEC_PROJECT))
    }
}

#[async_trait]
impl FunctionFetcher for GcfFetcher {
    fn name(&self) -> &'static str {
        "gcf"
    }

    fn can_fetch(&self, upstream: &Upstream) -> bool {
        upstream.upstream_type == UPSTREAM_TYPE_GCF
    }

    async fn fetch(&self, upstream: &Upstream) -> Result<Vec<Function>> {
        let project = self.project(upstream)?;
        let base = self.client.functions_url(project);

        let mut functions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = match &page_token {
                Some(token) => format!("{}?pageToken={}", base, urlencoding::encode(token)),
                None => base.clone(),
            };

            let response = self
                .client
                .get(&url)
                .await
                .context("Unable to get list of GCF functions")?;
            let page: ListFunctionsResponse =
                serde_json::from_value(response).context("Failed to parse GCF function list")?;

            functions.extend(
                page.functions
                    .into_iter()
                    .filter(|f| f.status == STATUS_ACTIVE)
                    .map(CloudFunction::into_function),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::debug!("Found {} functions in project {}", functions.len(), project);
        Ok(functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::auth::StaticToken;
    use crate::gcp::http::GcpHttpClient;
    use std::sync::Arc;

    fn fetcher(default_project: Option<&str>) -> GcfFetcher {
        let client = GcpClient::new(
            Arc::new(StaticToken("t".to_string())),
            GcpHttpClient::new(reqwest::Client::new()),
        );
        GcfFetcher::new(client, default_project.map(str::to_string))
    }

    #[test]
    fn test_http_trigger_spec() {
        let f: CloudFunction = serde_json::from_value(json!({
            "name": "projects/p/locations/us-central1/functions/hello",
            "status": "ACTIVE",
            "versionId": "3",
            "entryPoint": "Hello",
            "httpsTrigger": { "url": "https://example.net/hello" }
        }))
        .unwrap();

        let function = f.into_function();
        assert_eq!(function.name, "projects/p/locations/us-central1/functions/hello");
        assert_eq!(function.spec["Version"], "3");
        assert_eq!(function.spec["Entry"], "Hello");
        assert_eq!(
            function.spec["Trigger"],
            json!({ "Type": "HTTP", "URL": "https://example.net/hello" })
        );
    }

    #[test]
    fn test_event_trigger_spec() {
        let f: CloudFunction = serde_json::from_value(json!({
            "name": "projects/p/locations/us-central1/functions/on-upload",
            "status": "ACTIVE",
            "versionId": 7,
            "eventTrigger": {
                "eventType": "google.storage.object.finalize",
                "resource": "projects/_/buckets/uploads",
                "service": "storage.googleapis.com"
            }
        }))
        .unwrap();

        let function = f.into_function();
        assert_eq!(function.spec["Version"], "7");
        assert_eq!(function.spec["Trigger"]["Type"], "Event");
        assert_eq!(function.spec["Trigger"]["Event"], "google.storage.object.finalize");
        assert_eq!(function.spec["Trigger"]["Service"], "storage.googleapis.com");
    }

    #[test]
    fn test_project_from_spec_or_default() {
        let us = Upstream::new("default", "fns", UPSTREAM_TYPE_GCF);
        assert!(fetcher(None).project(&us).is_err());
        assert_eq!(fetcher(Some("fallback-project")).project(&us).unwrap(), "fallback-project");

        let us = us.with_spec(SPEC_PROJECT, "named-project");
        assert_eq!(fetcher(Some("fallback-project")).project(&us).unwrap(), "named-project");
    }

    #[test]
    fn test_can_fetch_only_gcf() {
        let f = fetcher(None);
        assert!(f.can_fetch(&Upstream::new("default", "fns", UPSTREAM_TYPE_GCF)));
        assert!(!f.can_fetch(&Upstream::new("default", "fns", "aws")));
    }
}
