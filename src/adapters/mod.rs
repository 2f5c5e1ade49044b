//! Adapter interfaces for external collaborators.
//!
//! The caches consume two capabilities they do not implement themselves:
//! byte transfer over the network and image decode/resize/encode.

pub mod http;
pub mod transform;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::CacheError;

pub use http::HttpFetcher;
pub use transform::JpegTransformer;

/// Raw response from the network collaborator
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,

    /// Response body
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a 2xx, non-empty response; network error otherwise
    pub fn into_body(self, resource: &str) -> Result<Vec<u8>, CacheError> {
        if !self.is_success() {
            return Err(CacheError::http_status(self.status, resource));
        }
        if self.body.is_empty() {
            return Err(CacheError::empty_body(resource));
        }
        Ok(self.body)
    }
}

/// Byte transfer capability shared by the manifest and image caches
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable fetcher name
    fn name(&self) -> &str;

    /// GET `resource` and return status plus body.
    ///
    /// Transport failures are `Err`; any status code is `Ok`.
    async fn fetch_bytes(&self, resource: &str) -> Result<FetchResponse>;
}

/// Decode, optionally downsample, and re-encode image bytes
pub trait ImageTransformer: Send + Sync {
    /// Returns JPEG bytes. `target_size` bounds the longest side when set.
    fn transform(
        &self,
        bytes: &[u8],
        target_size: Option<u32>,
        quality: u8,
    ) -> Result<Vec<u8>, CacheError>;
}
