//! GCP Client
//!
//! Combines a token source with the HTTP client and builds API URLs.

use super::auth::TokenSource;
use super::http::GcpHttpClient;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

const CLOUDFUNCTIONS_BASE_URL: &str = "https://cloudfunctions.googleapis.com";

#[derive(Clone)]
pub struct GcpClient {
    credentials: Arc<dyn TokenSource>,
    http: GcpHttpClient,
    base_url: String,
}

impl GcpClient {
    pub fn new(credentials: Arc<dyn TokenSource>, http: GcpHttpClient) -> Self {
        Self {
            credentials,
            http,
            base_url: CLOUDFUNCTIONS_BASE_URL.to_string(),
        }
    }

    /// Point the client at another endpoint (emulators, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.credentials.token().await?;
        self.http.get(url, &token).await
    }

    /// Build the Cloud Functions list URL for every location of a project
    pub fn functions_url(&self, project: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/-/functions",
            self.base_url,
            urlencoding::encode(project)
        )
    }
}
