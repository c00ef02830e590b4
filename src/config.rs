//! Configuration Management
//!
//! Settings are read from a YAML file (explicit path, or
//! `<config dir>/function-discovery/config.yaml`) and then overridden by
//! command line flags. Every field has a default, so an absent file is the
//! same as an empty one.

use crate::controller::{Backoff, ControllerOptions};
use crate::error::TransientPolicy;
use crate::store::ListFilter;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Only watch this namespace; all namespaces when unset
    pub namespace: Option<String>,
    pub workers: usize,
    /// Requeues before a failing upstream is abandoned
    pub max_retries: u32,
    pub resync_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_secs: u64,
    pub aws: AwsConfig,
    pub gcf: GcfConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub enabled: bool,
    pub poll_period_secs: u64,
    /// Overrides the regional Lambda endpoint
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcfConfig {
    pub enabled: bool,
    /// Project for `gcf` upstreams without `spec.project`
    pub project: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwaggerConfig {
    pub enabled: bool,
    pub retries: u32,
    /// Tried before the built-in URIs
    pub uris: Vec<String>,
    pub transient_policy: TransientPolicy,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            workers: 2,
            max_retries: 5,
            resync_secs: 300,
            backoff_base_ms: 5,
            backoff_max_secs: 1000,
            aws: AwsConfig::default(),
            gcf: GcfConfig::default(),
            swagger: SwaggerConfig::default(),
        }
    }
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_period_secs: 60,
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

impl Default for GcfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project: None,
            endpoint: None,
            timeout_secs: 30,
        }
    }
}

impl Default for SwaggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retries: 0,
            uris: Vec::new(),
            transient_policy: TransientPolicy::default(),
            timeout_secs: 5,
        }
    }
}

impl Config {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("function-discovery").join("config.yaml"))
    }

    /// Load from `path`, or from the default location if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with, such as zero periods
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.resync_secs == 0 {
            bail!("resync_secs must be greater than zero");
        }
        if self.aws.poll_period_secs == 0 {
            bail!("aws.poll_period_secs must be greater than zero");
        }
        if self.backoff_max_secs == 0 {
            bail!("backoff_max_secs must be greater than zero");
        }
        for (field, secs) in [
            ("aws.timeout_secs", self.aws.timeout_secs),
            ("gcf.timeout_secs", self.gcf.timeout_secs),
            ("swagger.timeout_secs", self.swagger.timeout_secs),
        ] {
            if secs == 0 {
                bail!("{} must be greater than zero", field);
            }
        }
        Ok(())
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            filter: ListFilter {
                namespace: self.namespace.clone(),
            },
            workers: self.workers,
            max_retries: self.max_retries,
            resync_period: Duration::from_secs(self.resync_secs),
            backoff: Backoff {
                base: Duration::from_millis(self.backoff_base_ms),
                max: Duration::from_secs(self.backoff_max_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.aws.poll_period_secs, 60);
        assert_eq!(config.swagger.retries, 0);
        assert_eq!(config.swagger.timeout_secs, 5);
        assert_eq!(config.gcf.timeout_secs, 30);
        assert_eq!(config.swagger.transient_policy, TransientPolicy::RouteOnly);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "namespace: gloo-system\nswagger:\n  retries: 2\n  uris: [/api/swagger.json]\n  transient_policy: network\naws:\n  enabled: false\n",
        )
        .unwrap();

        assert_eq!(config.namespace.as_deref(), Some("gloo-system"));
        assert_eq!(config.swagger.retries, 2);
        assert_eq!(config.swagger.uris, vec!["/api/swagger.json"]);
        assert_eq!(config.swagger.transient_policy, TransientPolicy::Network);
        assert!(config.swagger.enabled);
        assert!(!config.aws.enabled);
        assert_eq!(config.aws.poll_period_secs, 60);
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        assert!(Config::from_yaml("swagger:\n  transient_policy: sometimes\n").is_err());
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        for yaml in [
            "resync_secs: 0\n",
            "workers: 0\n",
            "aws:\n  poll_period_secs: 0\n",
            "swagger:\n  timeout_secs: 0\n",
        ] {
            let err = Config::from_yaml(yaml).expect_err(yaml);
            assert!(err.to_string().contains("must be"), "{}: {}", yaml, err);
        }
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_reports_invalid_values_with_path() {
        let path = std::env::temp_dir().join(format!(
            "function-discovery-zero-resync-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "resync_secs: 0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        let message = format!("{:#}", err);
        assert!(message.contains("Invalid config"));
        assert!(message.contains("resync_secs"));
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/function-discovery.yaml"))).is_err());
    }

    #[test]
    fn test_controller_options() {
        let config = Config {
            namespace: Some("ns".to_string()),
            resync_secs: 10,
            ..Config::default()
        };
        let options = config.controller_options();
        assert_eq!(options.filter.namespace.as_deref(), Some("ns"));
        assert_eq!(options.resync_period, Duration::from_secs(10));
        assert_eq!(options.backoff.base, Duration::from_millis(5));
    }
}
