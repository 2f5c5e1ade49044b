//! Caching and fetch coordination.
//!
//! This module contains:
//! - hashing: content keys for image files
//! - parser: manifest text to content items
//! - manifest_cache: single-flight manifest fetch with TTL
//! - image_cache: two-tier image cache with per-URL deduplication
//! - prefetch: head/tail image warming
//! - repository: the facade composing all of the above

pub mod hashing;
pub mod image_cache;
pub mod manifest_cache;
pub mod parser;
pub mod prefetch;
pub mod repository;

// Re-export commonly used types
pub use hashing::content_key;
pub use image_cache::{ImageCache, ImagePrefetcher, ImageSettings};
pub use manifest_cache::{ManifestCache, ManifestSettings, ManifestSource};
pub use parser::{is_image_url, parse_manifest};
pub use prefetch::{distinct_image_urls, PrefetchPipeline, PrefetchReport, PrefetchSettings};
pub use repository::{ContentRepository, Items};

/// Current wall-clock time as Unix epoch milliseconds
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
