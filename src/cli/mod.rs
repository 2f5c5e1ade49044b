//! Command-line interface for gallery-cache.
//!
//! Provides commands for syncing the manifest, listing items, loading
//! images, inspecting the image cache, and running a periodic refresh loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use crate::adapters::{Fetcher, HttpFetcher, JpegTransformer};
use crate::config::{self, paths, ResolvedConfig};
use crate::core::{ContentRepository, ImageCache, ManifestCache};
use crate::domain::ContentItem;

/// gallery-cache - Manifest-driven image gallery cache
#[derive(Parser, Debug)]
#[command(name = "gallery-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the manifest and warm the image cache
    Sync {
        /// Ignore the persisted manifest and hit the network
        #[arg(short, long)]
        force: bool,
    },

    /// List manifest items
    Items {
        /// Ignore the persisted manifest and hit the network
        #[arg(short, long)]
        force: bool,
    },

    /// Show one manifest item
    Item {
        /// Zero-based item index
        index: usize,

        /// Ignore the persisted manifest and hit the network
        #[arg(short, long)]
        force: bool,
    },

    /// Load an image into the cache and print its file paths
    Image {
        /// Image URL
        url: String,

        /// Only report what is already cached
        #[arg(long)]
        cached_only: bool,
    },

    /// Inspect or clear the image cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Refresh the manifest periodically and print item changes
    Watch {
        /// Hours between forced refreshes
        #[arg(long, default_value = "24")]
        interval_hours: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// File counts and sizes
    Info,

    /// Delete all cached images
    Clear,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = config::config()?;

        match self.command {
            Commands::Sync { force } => sync(config, force).await,
            Commands::Items { force } => list_items(config, force).await,
            Commands::Item { index, force } => show_item(config, index, force).await,
            Commands::Image { url, cached_only } => load_image(config, &url, cached_only).await,
            Commands::Cache { command } => match command {
                CacheCommands::Info => cache_info(config).await,
                CacheCommands::Clear => cache_clear(config).await,
            },
            Commands::Config => show_config(config),
            Commands::Watch { interval_hours } => {
                watch(config, watch_interval(interval_hours)).await
            }
        }
    }
}

fn http_fetcher(config: &ResolvedConfig) -> Result<Arc<dyn Fetcher>> {
    Ok(Arc::new(HttpFetcher::new(config.http_timeout)?))
}

async fn open_images(config: &ResolvedConfig, fetcher: Arc<dyn Fetcher>) -> Result<ImageCache> {
    let root = paths::images_dir(&config.home);
    ImageCache::open(&root, config.images.clone(), fetcher, Arc::new(JpegTransformer))
        .await
        .with_context(|| format!("Failed to open image cache at {}", root.display()))
}

/// Wire the facade from configuration
async fn open_repository(config: &ResolvedConfig) -> Result<ContentRepository> {
    let fetcher = http_fetcher(config)?;
    let manifest = ManifestCache::new(&config.home, config.manifest_settings()?, Arc::clone(&fetcher));
    let images = open_images(config, fetcher).await?;

    Ok(ContentRepository::new(
        Arc::new(manifest),
        images,
        config.prefetch.clone(),
    ))
}

/// Fetch the manifest and prefetch every image in the foreground
async fn sync(config: &ResolvedConfig, force: bool) -> Result<()> {
    let repo = open_repository(config).await?;
    let (items, report) = repo.sync(force).await.context("Manifest sync failed")?;

    let images = items.iter().filter(|i| i.image_url().is_some()).count();
    println!("Manifest: {} items ({} images)", items.len(), images);
    println!(
        "Images: {} distinct, {} cached, {} failed",
        report.requested, report.succeeded, report.failed
    );

    Ok(())
}

async fn list_items(config: &ResolvedConfig, force: bool) -> Result<()> {
    let repo = open_repository(config).await?;
    let items = repo.get_all_items(force).await?;

    if items.is_empty() {
        println!("Manifest is empty.");
        return Ok(());
    }

    for (index, item) in items.iter().enumerate() {
        println!("{:>4}  {}", index, item);
    }

    Ok(())
}

async fn show_item(config: &ResolvedConfig, index: usize, force: bool) -> Result<()> {
    let repo = open_repository(config).await?;
    let item = repo.get_item(index, force).await?;

    println!("Index: {}", index);
    match &item {
        ContentItem::Image { url, .. } => {
            println!("Type: image");
            println!("URL: {}", url);
            match repo.get_cached_image(url).await {
                Some(files) => {
                    println!("Original: {}", files.original.display());
                    println!("Preview: {}", files.preview.display());
                }
                None => println!("Cached: no"),
            }
        }
        ContentItem::Text { raw } => {
            println!("Type: text");
            println!("Text: {}", raw);
        }
    }

    Ok(())
}

async fn load_image(config: &ResolvedConfig, url: &str, cached_only: bool) -> Result<()> {
    let images = open_images(config, http_fetcher(config)?).await?;

    let files = if cached_only {
        match images.get_cached_image(url).await {
            Some(files) => files,
            None => {
                println!("Not cached: {}", url);
                return Ok(());
            }
        }
    } else {
        images
            .load_image(url)
            .await
            .with_context(|| format!("Failed to load {}", url))?
    };

    println!("Original: {}", files.original.display());
    println!("Preview: {}", files.preview.display());
    Ok(())
}

async fn cache_info(config: &ResolvedConfig) -> Result<()> {
    let images = open_images(config, http_fetcher(config)?).await?;
    let info = images.get_cache_info().await?;

    println!("Originals: {} ({})", info.original_count, info.original_dir.display());
    println!("Previews: {} ({})", info.preview_count, info.preview_dir.display());
    println!("Total size: {}", info.total_size_display());
    Ok(())
}

async fn cache_clear(config: &ResolvedConfig) -> Result<()> {
    let images = open_images(config, http_fetcher(config)?).await?;
    images.clear_cache().await?;

    println!("Image cache cleared.");
    Ok(())
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("Home: {}", config.home.display());
    println!(
        "Manifest URL: {}",
        config.manifest_url.as_deref().unwrap_or("(not set)")
    );
    println!("Manifest TTL: {:?}", config.manifest_ttl);
    println!("Image TTL: {:?}", config.images.ttl);
    println!("Preview size: {}px", config.images.preview_size);
    println!(
        "Prefetch: head {} then every {:?}",
        config.prefetch.head, config.prefetch.step
    );
    println!("HTTP timeout: {:?}", config.http_timeout);
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none)"),
    }
    Ok(())
}

/// First retry delay after a failed background refresh
pub const BASE_BACKOFF: Duration = Duration::from_secs(30);

/// Refresh period for `watch`; at least one hour
pub fn watch_interval(hours: u64) -> Duration {
    Duration::from_secs(hours.max(1).saturating_mul(60 * 60))
}

/// Exponential backoff, capped
pub fn next_backoff(current: Duration, cap: Duration) -> Duration {
    current.saturating_mul(2).min(cap)
}

/// Periodic forced refresh; prints every new item list until Ctrl-C
async fn watch(config: &ResolvedConfig, interval: Duration) -> Result<()> {
    let repo = Arc::new(open_repository(config).await?);

    let mut updates = Box::pin(repo.observe_items());
    let printer = tokio::spawn(async move {
        while let Some(items) = updates.next().await {
            println!("--- {} items ---", items.len());
            for (index, item) in items.iter().enumerate() {
                println!("{:>4}  {}", index, item);
            }
        }
    });

    let refresher = {
        let repo = Arc::clone(&repo);
        async move {
            let mut backoff = BASE_BACKOFF.min(interval);
            loop {
                match repo.get_all_items(true).await {
                    Ok(items) => {
                        tracing::info!(count = items.len(), "Background refresh succeeded");
                        backoff = BASE_BACKOFF.min(interval);
                        tokio::time::sleep(interval).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, retry_in = ?backoff, "Background refresh failed");
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff, interval);
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = refresher => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Watch stopping...");
        }
    }

    printer.abort();
    Ok(())
}
