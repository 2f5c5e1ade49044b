//! Canonical on-disk layout for the cache.
//!
//! Single source of truth - build paths from here instead of joining
//! strings at call sites.
//!
//! ## Layout
//!
//! | Path | Owner | Purpose |
//! |------|-------|---------|
//! | `manifest.txt` | ManifestCache | Manifest payload |
//! | `manifest.txt.meta` | ManifestCache | Fetch time (epoch ms), written after the payload |
//! | `images/originals/<hash>.jpg` | ImageCache | Full-resolution tier |
//! | `images/previews/<hash>.preview.jpg` | ImageCache | Preview tier |
//! | `images/metadata/<hash>.meta` | ImageCache | Fetch time (epoch ms), written last |

use std::path::{Path, PathBuf};

/// Manifest payload file name
pub const MANIFEST_FILE: &str = "manifest.txt";

/// Suffix appended to a payload to form its timestamp marker
pub const META_SUFFIX: &str = ".meta";

/// Manifest payload file
pub fn manifest_file(home: &Path) -> PathBuf {
    home.join(MANIFEST_FILE)
}

/// Manifest timestamp marker
pub fn manifest_meta_file(home: &Path) -> PathBuf {
    home.join(format!("{}{}", MANIFEST_FILE, META_SUFFIX))
}

/// Root of the image cache
pub fn images_dir(home: &Path) -> PathBuf {
    home.join("images")
}

/// Paths for one content key across both tiers and the marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePaths {
    pub original: PathBuf,
    pub preview: PathBuf,
    pub marker: PathBuf,
}

/// The three image-cache directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDirs {
    pub originals: PathBuf,
    pub previews: PathBuf,
    pub metadata: PathBuf,
}

impl ImageDirs {
    pub fn under(root: &Path) -> Self {
        Self {
            originals: root.join("originals"),
            previews: root.join("previews"),
            metadata: root.join("metadata"),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.originals, &self.previews, &self.metadata]
    }

    /// File names are pure functions of the key
    pub fn for_key(&self, key: &str) -> ImagePaths {
        ImagePaths {
            original: self.originals.join(format!("{}.jpg", key)),
            preview: self.previews.join(format!("{}.preview.jpg", key)),
            marker: self.metadata.join(format!("{}{}", key, META_SUFFIX)),
        }
    }
}
