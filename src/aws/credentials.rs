//! AWS credentials

use anyhow::{anyhow, Result};
use std::env;
use std::fmt;

/// Access key pair used to sign Lambda API calls
#[derive(Clone, PartialEq, Eq, Default)]
pub struct AccessToken {
    pub id: String,
    pub secret: String,
    pub session_token: Option<String>,
}

impl AccessToken {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            session_token: None,
        }
    }

    /// Load credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
    pub fn from_env() -> Result<Self> {
        let id = env::var("AWS_ACCESS_KEY_ID").map_err(|_| anyhow!("AWS_ACCESS_KEY_ID not set"))?;
        let secret = env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| anyhow!("AWS_SECRET_ACCESS_KEY not set"))?;
        let session_token = env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            id,
            secret,
            session_token,
        })
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("id", &mask_credential(&self.id))
            .field("secret", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Mask sensitive credential values for logging
pub fn mask_credential(value: &str) -> String {
    let count = value.chars().count();
    if count <= 8 {
        "*".repeat(count)
    } else {
        let head: String = value.chars().take(4).collect();
        let tail: String = value.chars().skip(count - 4).collect();
        format!("{}...{}", head, tail)
    }
}
