//! Google Cloud Functions discovery
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Authenticated client and API URL builders
//! - [`http`] - HTTP utilities for REST API calls
//! - [`functions`] - [`GcfFetcher`], listing the functions of `gcf` upstreams
//!
//! # Example
//!
//! ```ignore
//! use function_discovery::gcp::{GcfFetcher, GcpClient, GcpCredentials, GcpHttpClient};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let credentials = Arc::new(GcpCredentials::new().await?);
//!     let client = GcpClient::new(credentials, GcpHttpClient::new(reqwest::Client::new()));
//!     let fetcher = GcfFetcher::new(client, None);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod functions;
pub mod http;

pub use auth::{GcpCredentials, StaticToken, TokenSource};
pub use client::GcpClient;
pub use functions::GcfFetcher;
pub use http::GcpHttpClient;
