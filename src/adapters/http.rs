//! reqwest-backed network collaborator.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{FetchResponse, Fetcher};

/// Plain HTTP GET fetcher
pub struct HttpFetcher {
    /// HTTP client
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gallery-cache/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_bytes(&self, resource: &str) -> Result<FetchResponse> {
        let response = self
            .client
            .get(resource)
            .send()
            .await
            .with_context(|| format!("Failed to GET {}", resource))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", resource))?;

        tracing::debug!(resource, status, bytes = body.len(), "fetched");

        Ok(FetchResponse::new(status, body.to_vec()))
    }
}
