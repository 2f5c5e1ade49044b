//! Error taxonomy shared by the manifest and image caches.
//!
//! Raw failures (transport, filesystem, decoder) are classified into one of
//! three kinds at the point where they are caught.

use thiserror::Error;

/// Classified cache failure.
///
/// Messages are kept as strings so the error is `Clone`: a single failed
/// attempt is delivered to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Transport failure, non-2xx status or empty body
    #[error("Network error: {0}")]
    Network(String),

    /// Local read/write failure or corrupt marker
    #[error("IO error: {0}")]
    Io(String),

    /// Anything else, including decode and transform failures
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// The three kinds, without their payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Io,
    Unknown,
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Io(_) => ErrorKind::Io,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Network(msg) | Self::Io(msg) | Self::Unknown(msg) => msg,
        }
    }

    /// Non-2xx response from the network collaborator
    pub fn http_status(status: u16, resource: &str) -> Self {
        Self::Network(format!("HTTP {} for {}", status, resource))
    }

    /// 2xx response with nothing in it
    pub fn empty_body(resource: &str) -> Self {
        Self::Network(format!("Empty response body for {}", resource))
    }

    /// Transport failure reported by the network collaborator
    pub fn network(err: &anyhow::Error) -> Self {
        Self::Network(format!("{:#}", err))
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => Self::Io(io.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }
}
