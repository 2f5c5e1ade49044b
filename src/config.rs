//! Configuration for the gallery cache binary.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (GALLERY_HOME, GALLERY_MANIFEST_URL)
//! 2. Config file (.gallery/config.yaml)
//! 3. Defaults (~/.gallery)
//!
//! Config file discovery:
//! - Searches current directory and parents for .gallery/config.yaml
//! - `home` in the config file is relative to the .gallery/ directory
//!
//! The library types never read this module; they take explicit settings.

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{ImageSettings, ManifestSettings, PrefetchSettings};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Environment override for the data directory
pub const ENV_HOME: &str = "GALLERY_HOME";

/// Environment override for the manifest URL
pub const ENV_MANIFEST_URL: &str = "GALLERY_MANIFEST_URL";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    /// Data directory (relative to .gallery/)
    pub home: Option<String>,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub images: Option<ImagesConfig>,
    #[serde(default)]
    pub prefetch: Option<PrefetchConfig>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestConfig {
    pub url: Option<String>,
    pub ttl_hours: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImagesConfig {
    pub ttl_days: Option<u64>,
    pub preview_size: Option<u32>,
    pub original_quality: Option<u8>,
    pub preview_quality: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrefetchConfig {
    pub head: Option<usize>,
    pub step_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Data directory holding the manifest and image cache
    pub home: PathBuf,
    /// Manifest location, if known
    pub manifest_url: Option<String>,
    /// Manifest time-to-live
    pub manifest_ttl: Duration,
    /// Image cache settings
    pub images: ImageSettings,
    /// Prefetch schedule
    pub prefetch: PrefetchSettings,
    /// Per-request network timeout
    pub http_timeout: Duration,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Default network timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

impl ResolvedConfig {
    /// Manifest settings; fails when no URL is configured anywhere
    pub fn manifest_settings(&self) -> Result<ManifestSettings> {
        let url = self.manifest_url.clone().with_context(|| {
            format!(
                "No manifest URL configured (set {} or manifest.url in .gallery/config.yaml)",
                ENV_MANIFEST_URL
            )
        })?;

        Ok(ManifestSettings {
            url,
            ttl: self.manifest_ttl,
        })
    }

    fn from_file(config: ConfigFile, config_path: &Path, default_home: PathBuf) -> Self {
        // home is relative to .gallery/ directory
        let gallery_dir = config_path.parent().unwrap_or(Path::new("."));
        let home = config
            .home
            .as_deref()
            .map(|h| resolve_path(gallery_dir, h))
            .unwrap_or(default_home);

        let image_defaults = ImageSettings::default();
        let images = match config.images {
            Some(cfg) => ImageSettings {
                ttl: cfg
                    .ttl_days
                    .map(|d| Duration::from_secs(d * 24 * 60 * 60))
                    .unwrap_or(image_defaults.ttl),
                preview_size: cfg.preview_size.unwrap_or(image_defaults.preview_size),
                original_quality: cfg
                    .original_quality
                    .unwrap_or(image_defaults.original_quality),
                preview_quality: cfg.preview_quality.unwrap_or(image_defaults.preview_quality),
            },
            None => image_defaults,
        };

        let prefetch_defaults = PrefetchSettings::default();
        let prefetch = match config.prefetch {
            Some(cfg) => PrefetchSettings {
                head: cfg.head.unwrap_or(prefetch_defaults.head),
                step: cfg
                    .step_ms
                    .map(Duration::from_millis)
                    .unwrap_or(prefetch_defaults.step),
            },
            None => prefetch_defaults,
        };

        Self {
            home,
            manifest_url: config.manifest.url,
            manifest_ttl: config
                .manifest
                .ttl_hours
                .map(|h| Duration::from_secs(h * 60 * 60))
                .unwrap_or(ManifestSettings::DEFAULT_TTL),
            images,
            prefetch,
            http_timeout: config
                .http
                .and_then(|h| h.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
            config_file: Some(config_path.to_path_buf()),
        }
    }

    fn defaults(home: PathBuf) -> Self {
        Self {
            home,
            manifest_url: None,
            manifest_ttl: ManifestSettings::DEFAULT_TTL,
            images: ImageSettings::default(),
            prefetch: PrefetchSettings::default(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            config_file: None,
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".gallery").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".gallery");

    let mut resolved = match find_config_file() {
        Some(config_path) => {
            let config = load_config_file(&config_path)?;
            ResolvedConfig::from_file(config, &config_path, default_home)
        }
        None => ResolvedConfig::defaults(default_home),
    };

    // Environment always wins
    if let Ok(env_home) = std::env::var(ENV_HOME) {
        resolved.home = PathBuf::from(env_home);
    }
    if let Ok(env_url) = std::env::var(ENV_MANIFEST_URL) {
        resolved.manifest_url = Some(env_url);
    }

    Ok(resolved)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
