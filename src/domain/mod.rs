//! Domain types for the gallery cache.
//!
//! This module contains the core data structures:
//! - CacheState / ManifestRecord: manifest cache state machine
//! - CacheError: the three-kind failure taxonomy
//! - ContentItem: parsed manifest lines
//! - ImageFiles / CacheInfo: image cache entries and statistics

pub mod error;
pub mod image;
pub mod item;
pub mod state;

// Re-export commonly used types
pub use error::{CacheError, ErrorKind};
pub use image::{CacheInfo, ImageFiles};
pub use item::ContentItem;
pub use state::{CacheState, ManifestRecord};
