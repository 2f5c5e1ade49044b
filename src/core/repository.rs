//! Content facade: manifest cache + parser + prefetch + image cache.
//!
//! Keeps one parsed item list plus the manifest timestamp it came from.
//! `get_all_items` and `observe_items` read and write that pair under the
//! same lock, so two parses never race to install a stale list.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::image_cache::ImageCache;
use super::manifest_cache::ManifestSource;
use super::parser::parse_manifest;
use super::prefetch::{distinct_image_urls, PrefetchPipeline, PrefetchReport, PrefetchSettings};
use crate::domain::{CacheError, CacheInfo, CacheState, ContentItem, ImageFiles, ManifestRecord};

/// Shared, immutable item list
pub type Items = Arc<[ContentItem]>;

#[derive(Default)]
struct ParsedItems {
    items: Option<Items>,
    last_parsed_ms: i64,
}

impl ParsedItems {
    /// Parse and install unconditionally
    fn store(&mut self, record: &ManifestRecord) -> Items {
        let items: Items = parse_manifest(&record.content).into();
        debug!(count = items.len(), fetched_at_ms = record.fetched_at_ms, "Parsed manifest");

        self.items = Some(Arc::clone(&items));
        self.last_parsed_ms = record.fetched_at_ms;
        items
    }

    /// Parse only if `record` is strictly newer than what we hold.
    /// Returns the items and whether a parse happened.
    fn refresh(&mut self, record: &ManifestRecord) -> (Items, bool) {
        if let Some(items) = &self.items {
            if record.fetched_at_ms <= self.last_parsed_ms {
                return (Arc::clone(items), false);
            }
        }
        (self.store(record), true)
    }
}

/// The API the presentation layer talks to
pub struct ContentRepository {
    manifest: Arc<dyn ManifestSource>,
    images: ImageCache,
    prefetch: PrefetchPipeline,
    parsed: Arc<Mutex<ParsedItems>>,
}

impl ContentRepository {
    pub fn new(
        manifest: Arc<dyn ManifestSource>,
        images: ImageCache,
        prefetch: PrefetchSettings,
    ) -> Self {
        let prefetch = PrefetchPipeline::new(Arc::new(images.clone()), prefetch);

        Self {
            manifest,
            images,
            prefetch,
            parsed: Arc::new(Mutex::new(ParsedItems::default())),
        }
    }

    /// All manifest items, in document order; warms images in the background
    pub async fn get_all_items(&self, force_refresh: bool) -> Result<Items, CacheError> {
        let items = self.load_items(force_refresh).await?;
        self.prefetch.launch(&items);
        Ok(items)
    }

    /// Load the items and warm every image before returning
    pub async fn sync(&self, force_refresh: bool) -> Result<(Items, PrefetchReport), CacheError> {
        let items = self.load_items(force_refresh).await?;
        let report = self.warm(&items).await;
        Ok((items, report))
    }

    async fn load_items(&self, force_refresh: bool) -> Result<Items, CacheError> {
        let mut parsed = self.parsed.lock().await;

        if !force_refresh {
            if let Some(items) = &parsed.items {
                return Ok(Arc::clone(items));
            }
        }

        let record = self.manifest.fetch_record(force_refresh).await?;
        Ok(parsed.store(&record))
    }

    /// Item at `index`; warms its image before returning
    pub async fn get_item(&self, index: usize, force_refresh: bool) -> Result<ContentItem, CacheError> {
        let items = self.get_all_items(force_refresh).await?;

        let item = items.get(index).cloned().ok_or_else(|| {
            CacheError::Unknown(format!("Index {} out of bounds for {} items", index, items.len()))
        })?;

        if let Some(url) = item.image_url() {
            if let Err(err) = self.images.prefetch(url).await {
                warn!(url, error = %err, "Prefetch for item failed");
            }
        }

        Ok(item)
    }

    /// Item lists as the manifest changes.
    ///
    /// Emits the current list on subscription if the manifest is ready, then
    /// once per new `Ready` timestamp. Re-deliveries of an already-parsed
    /// state neither re-parse nor re-emit.
    pub fn observe_items(&self) -> impl Stream<Item = Items> + Send + 'static {
        let observer = Observer {
            rx: self.manifest.subscribe(),
            parsed: Arc::clone(&self.parsed),
            prefetch: self.prefetch.clone(),
            last: None,
            started: false,
        };

        futures::stream::unfold(observer, |mut observer| async move {
            let items = observer.next_items().await?;
            Some((items, observer))
        })
    }

    /// Prefetch `items` in the foreground and report the outcome
    pub async fn warm(&self, items: &[ContentItem]) -> PrefetchReport {
        self.prefetch.run(distinct_image_urls(items)).await
    }

    /// Manifest state transitions
    pub fn manifest_state(&self) -> watch::Receiver<CacheState> {
        self.manifest.subscribe()
    }

    pub async fn prefetch_image(&self, url: &str) -> Result<ImageFiles, CacheError> {
        self.images.prefetch(url).await
    }

    pub async fn load_image(&self, url: &str) -> Result<ImageFiles, CacheError> {
        self.images.load_image(url).await
    }

    pub async fn get_cached_image(&self, url: &str) -> Option<ImageFiles> {
        self.images.get_cached_image(url).await
    }

    pub async fn clear_image_cache(&self) -> Result<(), CacheError> {
        self.images.clear_cache().await
    }

    pub async fn get_cache_info(&self) -> Result<CacheInfo, CacheError> {
        self.images.get_cache_info().await
    }
}

struct Observer {
    rx: watch::Receiver<CacheState>,
    parsed: Arc<Mutex<ParsedItems>>,
    prefetch: PrefetchPipeline,
    last: Option<Items>,
    started: bool,
}

impl Observer {
    /// Next distinct item list; None once the manifest cache is gone
    async fn next_items(&mut self) -> Option<Items> {
        loop {
            if self.started {
                self.rx.changed().await.ok()?;
            }
            self.started = true;

            let state = self.rx.borrow_and_update().clone();
            let Some(record) = state.as_record() else {
                continue;
            };

            let (items, parsed) = self.parsed.lock().await.refresh(&record);
            if parsed {
                self.prefetch.launch(&items);
            }

            if self.last.as_ref() == Some(&items) {
                continue;
            }

            self.last = Some(Arc::clone(&items));
            return Some(items);
        }
    }
}
