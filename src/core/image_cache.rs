//! Content-addressed two-tier image cache.
//!
//! Each URL maps to `sha256(url)` and to three files: the re-encoded
//! original, a downscaled preview, and a freshness marker. The marker is
//! written last; an entry without a fresh marker does not exist as far as
//! readers are concerned.
//!
//! Requests for the same URL share one physical download+resize sequence
//! through the in-flight table. Different URLs proceed in parallel.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::epoch_ms;
use super::hashing::content_key;
use crate::adapters::{Fetcher, ImageTransformer};
use crate::config::paths::{ImageDirs, ImagePaths};
use crate::domain::{CacheError, CacheInfo, ImageFiles};

/// Image cache tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSettings {
    /// Validity window of a cached pair
    pub ttl: Duration,

    /// Longest side of the preview tier, in pixels
    pub preview_size: u32,

    /// JPEG quality of the original tier
    pub original_quality: u8,

    /// JPEG quality of the preview tier
    pub preview_quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            preview_size: 100,
            original_quality: 85,
            preview_quality: 90,
        }
    }
}

/// Best-effort warming interface used by the prefetch pipeline
#[async_trait]
pub trait ImagePrefetcher: Send + Sync {
    async fn prefetch(&self, url: &str) -> Result<ImageFiles, CacheError>;
}

type SharedLoad = Shared<BoxFuture<'static, Result<ImageFiles, CacheError>>>;

/// Image cache handle (cheap to clone)
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ImageSettings,
    dirs: ImageDirs,
    fetcher: Arc<dyn Fetcher>,
    transformer: Arc<dyn ImageTransformer>,
    /// URL -> pending load; insert and remove both happen under this lock
    in_flight: Mutex<HashMap<String, SharedLoad>>,
}

impl ImageCache {
    /// Open (creating if needed) an image cache rooted at `root`
    pub async fn open(
        root: &Path,
        settings: ImageSettings,
        fetcher: Arc<dyn Fetcher>,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Result<Self, CacheError> {
        let dirs = ImageDirs::under(root);
        for dir in dirs.all() {
            fs::create_dir_all(dir).await?;
        }

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                dirs,
                fetcher,
                transformer,
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Warm the cache for `url`, returning both tiers
    pub async fn prefetch(&self, url: &str) -> Result<ImageFiles, CacheError> {
        self.load_shared(url).await
    }

    /// Both tiers for `url`, downloading if the cached pair is missing or stale
    pub async fn load_image(&self, url: &str) -> Result<ImageFiles, CacheError> {
        self.load_shared(url).await
    }

    /// Cached pair for `url` if it is valid; never touches the network
    pub async fn get_cached_image(&self, url: &str) -> Option<ImageFiles> {
        let paths = self.inner.dirs.for_key(&content_key(url));
        if self.inner.is_valid(&paths).await {
            Some(files(&paths))
        } else {
            None
        }
    }

    /// Remove every cached file and recreate the empty layout
    pub async fn clear_cache(&self) -> Result<(), CacheError> {
        for dir in self.inner.dirs.all() {
            match fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            fs::create_dir_all(dir).await?;
        }

        info!("Image cache cleared");
        Ok(())
    }

    /// File counts and total bytes across both tiers
    pub async fn get_cache_info(&self) -> Result<CacheInfo, CacheError> {
        let (original_count, original_bytes) = dir_stats(&self.inner.dirs.originals).await?;
        let (preview_count, preview_bytes) = dir_stats(&self.inner.dirs.previews).await?;

        Ok(CacheInfo {
            original_count,
            preview_count,
            total_size_bytes: original_bytes + preview_bytes,
            original_dir: self.inner.dirs.originals.clone(),
            preview_dir: self.inner.dirs.previews.clone(),
        })
    }

    /// Number of URLs with a load currently in flight
    pub async fn in_flight_len(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }

    async fn load_shared(&self, url: &str) -> Result<ImageFiles, CacheError> {
        let pending = {
            let mut table = self.inner.in_flight.lock().await;
            match table.get(url) {
                Some(existing) => {
                    debug!(url, "Joining in-flight image load");
                    existing.clone()
                }
                None => {
                    let load = Inner::spawn_load(Arc::clone(&self.inner), url.to_string());
                    table.insert(url.to_string(), load.clone());
                    load
                }
            }
        };

        pending.await
    }
}

#[async_trait]
impl ImagePrefetcher for ImageCache {
    async fn prefetch(&self, url: &str) -> Result<ImageFiles, CacheError> {
        self.load_shared(url).await
    }
}

impl Inner {
    /// Run the load in its own task so it outlives any single caller
    fn spawn_load(inner: Arc<Inner>, url: String) -> SharedLoad {
        let handle = tokio::spawn(async move {
            let result = AssertUnwindSafe(inner.load_or_download(&url))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(CacheError::Unknown(format!("Image load panicked: {}", url))));

            inner.in_flight.lock().await.remove(&url);
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(CacheError::Unknown(format!("Image load task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    async fn load_or_download(&self, url: &str) -> Result<ImageFiles, CacheError> {
        let key = content_key(url);
        let paths = self.dirs.for_key(&key);

        if self.is_valid(&paths).await {
            debug!(url, key = %key, "Image cache hit");
            return Ok(files(&paths));
        }

        self.download(url, &paths).await
    }

    /// Both tiers present and the marker within the TTL
    async fn is_valid(&self, paths: &ImagePaths) -> bool {
        exists(&paths.original).await
            && exists(&paths.preview).await
            && self.marker_is_fresh(&paths.marker).await
    }

    async fn marker_is_fresh(&self, marker: &Path) -> bool {
        let Ok(text) = fs::read_to_string(marker).await else {
            return false;
        };

        match text.trim().parse::<i64>() {
            Ok(cached_at) => ((epoch_ms() - cached_at).max(0) as u128) < self.settings.ttl.as_millis(),
            Err(_) => {
                warn!(path = %marker.display(), "Unparseable image marker");
                false
            }
        }
    }

    async fn download(&self, url: &str, paths: &ImagePaths) -> Result<ImageFiles, CacheError> {
        // An expired marker must not vouch for tiers we are about to replace
        remove_if_exists(&paths.marker).await?;

        info!(url, fetcher = self.fetcher.name(), "Downloading image");
        let response = self
            .fetcher
            .fetch_bytes(url)
            .await
            .map_err(|e| CacheError::network(&e))?;
        let bytes = Arc::new(response.into_body(url)?);

        if let Err(err) = self.write_entry(bytes, paths).await {
            warn!(url, error = %err, "Image cache write failed, discarding partial entry");
            let _ = remove_if_exists(&paths.original).await;
            let _ = remove_if_exists(&paths.preview).await;
            let _ = remove_if_exists(&paths.marker).await;
            return Err(err);
        }

        debug!(url, "Image cached");
        Ok(files(paths))
    }

    /// Original, then preview, then the marker
    async fn write_entry(&self, bytes: Arc<Vec<u8>>, paths: &ImagePaths) -> Result<(), CacheError> {
        for dir in self.dirs.all() {
            fs::create_dir_all(dir).await?;
        }

        let original = self
            .transform(Arc::clone(&bytes), None, self.settings.original_quality)
            .await?;
        fs::write(&paths.original, original).await?;

        let preview = self
            .transform(
                bytes,
                Some(self.settings.preview_size),
                self.settings.preview_quality,
            )
            .await?;
        fs::write(&paths.preview, preview).await?;

        fs::write(&paths.marker, epoch_ms().to_string()).await?;
        Ok(())
    }

    async fn transform(
        &self,
        bytes: Arc<Vec<u8>>,
        target_size: Option<u32>,
        quality: u8,
    ) -> Result<Vec<u8>, CacheError> {
        let transformer = Arc::clone(&self.transformer);
        tokio::task::spawn_blocking(move || transformer.transform(&bytes, target_size, quality))
            .await
            .map_err(|e| CacheError::Unknown(format!("Image transform task failed: {}", e)))?
    }
}

fn files(paths: &ImagePaths) -> ImageFiles {
    ImageFiles {
        original: paths.original.clone(),
        preview: paths.preview.clone(),
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// (file count, total bytes) of the regular files directly in `dir`
async fn dir_stats(dir: &Path) -> Result<(usize, u64), CacheError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((0, 0)),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    let mut bytes = 0;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            count += 1;
            bytes += metadata.len();
        }
    }

    Ok((count, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FetchResponse, JpegTransformer};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const URL: &str = "https://example.com/pics/cat.png";

    struct PngFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for PngFetcher {
        fn name(&self) -> &str {
            "png"
        }

        async fn fetch_bytes(&self, _resource: &str) -> anyhow::Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let img = image::RgbImage::from_pixel(300, 200, image::Rgb([10, 120, 240]));
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, image::ImageFormat::Png)?;
            Ok(FetchResponse::new(200, out.into_inner()))
        }
    }

    async fn open_cache(temp: &TempDir) -> (ImageCache, Arc<PngFetcher>) {
        let fetcher = Arc::new(PngFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = ImageCache::open(
            temp.path(),
            ImageSettings::default(),
            fetcher.clone(),
            Arc::new(JpegTransformer),
        )
        .await
        .unwrap();
        (cache, fetcher)
    }

    #[tokio::test]
    async fn test_load_writes_both_tiers_and_marker() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = open_cache(&temp).await;

        let files = cache.load_image(URL).await.unwrap();
        let key = content_key(URL);

        assert_eq!(files.original, temp.path().join("originals").join(format!("{}.jpg", key)));
        assert_eq!(
            files.preview,
            temp.path().join("previews").join(format!("{}.preview.jpg", key))
        );
        assert!(temp.path().join("metadata").join(format!("{}.meta", key)).exists());

        let preview = image::open(&files.preview).unwrap();
        assert_eq!(preview.width().max(preview.height()), 100);
    }

    #[tokio::test]
    async fn test_valid_entry_is_served_from_disk() {
        let temp = TempDir::new().unwrap();
        let (cache, fetcher) = open_cache(&temp).await;

        let first = cache.prefetch(URL).await.unwrap();
        let second = cache.load_image(URL).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_cached_image(URL).await, Some(first));
    }

    #[tokio::test]
    async fn test_get_cached_image_never_fetches() {
        let temp = TempDir::new().unwrap();
        let (cache, fetcher) = open_cache(&temp).await;

        assert!(cache.get_cached_image(URL).await.is_none());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_marker_triggers_refetch() {
        let temp = TempDir::new().unwrap();
        let (cache, fetcher) = open_cache(&temp).await;

        cache.load_image(URL).await.unwrap();

        let marker = temp.path().join("metadata").join(format!("{}.meta", content_key(URL)));
        let eight_days_ago = epoch_ms() - 8 * 24 * 60 * 60 * 1000;
        std::fs::write(&marker, eight_days_ago.to_string()).unwrap();

        assert!(cache.get_cached_image(URL).await.is_none());
        cache.load_image(URL).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreadable_marker_is_invalid() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = open_cache(&temp).await;

        cache.load_image(URL).await.unwrap();
        let marker = temp.path().join("metadata").join(format!("{}.meta", content_key(URL)));
        std::fs::write(&marker, "garbage").unwrap();

        assert!(cache.get_cached_image(URL).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_info_and_clear() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = open_cache(&temp).await;

        cache.load_image(URL).await.unwrap();
        cache.load_image("https://example.com/pics/dog.png").await.unwrap();

        let info = cache.get_cache_info().await.unwrap();
        assert_eq!(info.original_count, 2);
        assert_eq!(info.preview_count, 2);
        assert!(info.total_size_bytes > 0);

        cache.clear_cache().await.unwrap();

        let info = cache.get_cache_info().await.unwrap();
        assert_eq!(info.original_count, 0);
        assert_eq!(info.preview_count, 0);
        assert_eq!(info.total_size_bytes, 0);
        assert!(temp.path().join("metadata").is_dir());
        assert!(cache.get_cached_image(URL).await.is_none());
    }

    #[tokio::test]
    async fn test_in_flight_table_is_empty_after_completion() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = open_cache(&temp).await;

        cache.load_image(URL).await.unwrap();
        assert_eq!(cache.in_flight_len().await, 0);
    }
}
