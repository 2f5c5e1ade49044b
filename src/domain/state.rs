//! Manifest cache state machine.
//!
//! `Empty → Loading → Ready | Error`, one value current at a time.

use super::error::CacheError;

/// Persisted manifest payload plus the moment it was fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    /// Raw manifest text
    pub content: String,

    /// Unix epoch milliseconds
    pub fetched_at_ms: i64,
}

impl ManifestRecord {
    pub fn new(content: impl Into<String>, fetched_at_ms: i64) -> Self {
        Self {
            content: content.into(),
            fetched_at_ms,
        }
    }

    /// Age relative to `now_ms`; never negative
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.fetched_at_ms).max(0)
    }
}

/// Current state of the manifest cache
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CacheState {
    /// Nothing fetched yet in this process
    #[default]
    Empty,

    /// A fetch is in flight
    Loading,

    /// Latest successful fetch
    Ready { content: String, fetched_at_ms: i64 },

    /// Latest fetch failed
    Error(CacheError),
}

impl CacheState {
    pub fn ready(record: &ManifestRecord) -> Self {
        Self::Ready {
            content: record.content.clone(),
            fetched_at_ms: record.fetched_at_ms,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Ready or Error
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready { .. } | Self::Error(_))
    }

    /// The record behind a `Ready` state
    pub fn as_record(&self) -> Option<ManifestRecord> {
        match self {
            Self::Ready {
                content,
                fetched_at_ms,
            } => Some(ManifestRecord::new(content.clone(), *fetched_at_ms)),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` should notify observers.
    ///
    /// Loading → Loading is collapsed into a no-op.
    pub fn accepts(&self, next: &CacheState) -> bool {
        !(self.is_loading() && next.is_loading())
    }
}
