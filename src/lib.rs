//! gallery-cache - Manifest-driven image gallery cache
//!
//! Fetches a remote manifest (one image URL or text line per line), keeps it
//! on disk with a time-based refresh policy, parses it into typed items, and
//! warms a content-addressed image cache ahead of the UI asking for images.
//!
//! # Architecture
//!
//! ```text
//! trigger → ManifestCache::fetch → parse_manifest → ContentRepository
//!                                                      │
//!                                     PrefetchPipeline ┘→ ImageCache → disk
//! ```
//!
//! - The manifest cache is single-flight: concurrent callers share one fetch.
//! - The image cache deduplicates per URL: concurrent callers share one
//!   download+resize sequence.
//! - Prefetching is best-effort and never blocks the caller.
//!
//! # Modules
//!
//! - `adapters`: Network and image-transform collaborators
//! - `core`: Caches, parser, prefetch pipeline, content facade
//! - `domain`: Data structures (CacheState, ContentItem, CacheError)
//! - `config`: Layered configuration and on-disk layout
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Fetch the manifest and warm all images
//! GALLERY_MANIFEST_URL=https://example.com/test/images.txt gallery-cache sync
//!
//! # List items, reusing the persisted manifest if fresh
//! gallery-cache items
//!
//! # Keep refreshing in the background
//! gallery-cache watch --interval-hours 24
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{FetchResponse, Fetcher, HttpFetcher, ImageTransformer, JpegTransformer};
pub use core::{
    ContentRepository, ImageCache, ImageSettings, ManifestCache, ManifestSettings, ManifestSource,
    PrefetchPipeline, PrefetchSettings,
};
pub use domain::{CacheError, CacheInfo, CacheState, ContentItem, ErrorKind, ImageFiles, ManifestRecord};
