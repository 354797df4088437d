//! HTTP page fetching.
//!
//! The `PageFetcher` trait is the boundary behind which rendering, proxy
//! rotation, and similar mechanics live; the default implementation is a
//! plain reqwest client with a fixed per-request timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::error::FetchError;

/// Options for a single page fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Ask the fetcher to execute scripts before returning content.
    /// The plain HTTP fetcher ignores this.
    pub render_scripts: bool,
    /// Route the request through a proxy, when the fetcher supports one.
    pub use_proxy: bool,
}

/// A fetched page: raw body plus the server-reported content type.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub content: String,
    pub content_type: String,
}

/// Capability to fetch one page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: FetchOptions) -> Result<FetchedPage, FetchError>;
}

/// Plain HTTP fetcher with timeout and compression support.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher. Every request carries `timeout`; a timed-out fetch
    /// is a per-page failure, never a hang for the whole walk.
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, _options: FetchOptions) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let content = response.text().await.map_err(FetchError::from_reqwest)?;
        if content.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        Ok(FetchedPage {
            content,
            content_type,
        })
    }
}
