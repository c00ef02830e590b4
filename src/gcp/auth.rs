//! GCP Authentication
//!
//! Handles authentication using Application Default Credentials (ADC),
//! service account keys (`GOOGLE_APPLICATION_CREDENTIALS`), or gcloud CLI
//! credentials.

use anyhow::{Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Token TTL assumed when the provider does not report one
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Supplies bearer tokens for GCP API calls
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// Expiry with the buffer already applied
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Create new GCP credentials using Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Set GOOGLE_APPLICATION_CREDENTIALS or run 'gcloud auth application-default login'",
        )?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an access token, reusing the cached one while it is still valid
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;
        let token_str = token.as_str().to_string();

        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;
        *self.token_cache.write().await = Some(CachedToken {
            token: token_str.clone(),
            expires_at,
        });

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

#[async_trait]
impl TokenSource for GcpCredentials {
    async fn token(&self) -> Result<String> {
        self.get_token().await
    }
}

/// A fixed bearer token, e.g. for emulators
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Get the gcloud configuration directory
fn gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Project IDs must be 6-30 characters of lowercase letters, digits and
/// hyphens, start with a letter and not end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Project used for `gcf` upstreams that do not name one
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    let config_dir = gcloud_config_dir()?;
    let active_config = std::fs::read_to_string(config_dir.join("active_config")).ok()?;
    let config_name = active_config.trim();

    // Guard against path traversal through the config name
    if !config_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let content = std::fs::read_to_string(
        config_dir
            .join("configurations")
            .join(format!("config_{}", config_name)),
    )
    .ok()?;
    core_project(&content)
}

/// Read `project` from the `[core]` section of a gcloud configuration file
fn core_project(content: &str) -> Option<String> {
    let mut in_core_section = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line == "[core]" {
            in_core_section = true;
        } else if line.starts_with('[') {
            in_core_section = false;
        } else if in_core_section {
            if let Some((key, value)) = line.split_once('=') {
                let project = value.trim();
                if key.trim() == "project" && validate_project_id(project) {
                    return Some(project.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_project_id() {
        assert!(validate_project_id("my-project-123"));
        assert!(!validate_project_id("short"));
        assert!(!validate_project_id("1project"));
        assert!(!validate_project_id("trailing-"));
        assert!(!validate_project_id("Upper-Case"));
    }

    #[test]
    fn test_core_project_reads_core_section_only() {
        let content = "\
[compute]
project = wrong-project

; comment
[core]
account = someone@example.com
project = right-project
";
        assert_eq!(core_project(content), Some("right-project".to_string()));
        assert_eq!(core_project("[core]\nproject = x\n"), None);
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticToken("abc".to_string());
        assert_eq!(source.token().await.unwrap(), "abc");
    }
}
