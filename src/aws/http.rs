//! Lightweight Lambda client with SigV4 signing
//!
//! Only `ListFunctions` is needed, so a signed GET over reqwest stands in
//! for the full SDK.

use super::credentials::{mask_credential, AccessToken};
use super::{Lambda, LambdaFetcher};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4::SigningParams;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::Client;
use serde::Deserialize;
use std::time::SystemTime;
use tracing::{debug, trace, warn};

const SIGNING_NAME: &str = "lambda";
const API_VERSION: &str = "2015-03-31";
/// Page size requested from ListFunctions
const PAGE_SIZE: &str = "50";
/// Lambdas in any other state are not surfaced until they become active
const STATE_ACTIVE: &str = "Active";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListFunctionsResponse {
    #[serde(default)]
    functions: Vec<FunctionConfiguration>,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FunctionConfiguration {
    function_name: String,
    version: String,
    /// Not always returned by ListFunctions; absent means active
    #[serde(default)]
    state: Option<String>,
}

/// Lambda API client for any region
#[derive(Clone)]
pub struct LambdaClient {
    http_client: Client,
    /// Overrides the regional endpoint (LocalStack, tests)
    endpoint_url: Option<String>,
}

impl LambdaClient {
    pub fn new(http_client: Client, endpoint_url: Option<String>) -> Self {
        Self {
            http_client,
            endpoint_url,
        }
    }

    fn endpoint(&self, region: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://lambda.{}.amazonaws.com", region),
        }
    }

    /// List every active function version in `region`
    pub async fn list_functions(&self, region: &str, token: &AccessToken) -> Result<Vec<Lambda>> {
        debug!(
            "Listing lambdas in {} with access key {}",
            region,
            mask_credential(&token.id)
        );

        let mut lambdas = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = url::Url::parse(&format!(
                "{}/{}/functions/",
                self.endpoint(region),
                API_VERSION
            ))?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("FunctionVersion", "ALL");
                query.append_pair("MaxItems", PAGE_SIZE);
                if let Some(m) = &marker {
                    query.append_pair("Marker", m);
                }
            }

            let body = self.signed_get(region, token, &url).await?;
            let page: ListFunctionsResponse =
                serde_json::from_str(&body).context("Failed to parse ListFunctions response")?;

            for f in page.functions {
                let active = f.state.as_deref().map(|s| s == STATE_ACTIVE).unwrap_or(true);
                if active {
                    lambdas.push(Lambda::new(f.function_name, f.version));
                } else {
                    trace!("Skipping {}:{} in state {:?}", f.function_name, f.version, f.state);
                }
            }

            match page.next_marker.filter(|m| !m.is_empty()) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        debug!("Found {} lambdas in {}", lambdas.len(), region);
        Ok(lambdas)
    }

    /// Make a signed GET request
    async fn signed_get(&self, region: &str, token: &AccessToken, url: &url::Url) -> Result<String> {
        let host = url.host_str().ok_or_else(|| anyhow!("Invalid URL"))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let headers = [("host", host.as_str())];

        let creds = aws_credential_types::Credentials::new(
            &token.id,
            &token.secret,
            token.session_token.clone(),
            None,
            "function-discovery",
        );
        let identity: Identity = creds.into();

        let signing_params = SigningParams::builder()
            .identity(&identity)
            .region(region)
            .name(SIGNING_NAME)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()?
            .into();

        let signable_request = SignableRequest::new(
            "GET",
            url.as_str(),
            headers.iter().copied(),
            SignableBody::Bytes(&[]),
        )?;
        let (signing_instructions, _signature) =
            sign(signable_request, &signing_params)?.into_parts();

        let mut request = self.http_client.get(url.as_str());
        for (name, value) in signing_instructions.headers() {
            request = request.header(name.to_string(), value.to_string());
        }

        trace!("Sending GET request to {}", url);
        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            warn!(
                "Lambda request failed: status={}, body={}",
                status,
                text.chars().take(500).collect::<String>()
            );
            return Err(anyhow!("Lambda request failed ({})", status));
        }

        Ok(text)
    }
}

#[async_trait]
impl LambdaFetcher for LambdaClient {
    async fn fetch(&self, region: &str, token: &AccessToken) -> Result<Vec<Lambda>> {
        self.list_functions(region, token).await
    }
}
