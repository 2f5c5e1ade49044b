//! Image cache entries and aggregate statistics.

use std::path::PathBuf;

/// Both cached tiers of one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFiles {
    /// Full-resolution re-encoded file
    pub original: PathBuf,

    /// Downscaled preview file
    pub preview: PathBuf,
}

/// Aggregate counts for the on-disk image cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub original_count: usize,
    pub preview_count: usize,
    pub total_size_bytes: u64,
    pub original_dir: PathBuf,
    pub preview_dir: PathBuf,
}

impl CacheInfo {
    /// Human-readable size (e.g. "1.4 MB")
    pub fn total_size_display(&self) -> String {
        const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
        let mut size = self.total_size_bytes as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{} {}", self.total_size_bytes, UNITS[0])
        } else {
            format!("{:.1} {}", size, UNITS[unit])
        }
    }
}
