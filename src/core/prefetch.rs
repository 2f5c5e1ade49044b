//! Best-effort image prefetch pipeline.
//!
//! Distinct image URLs are split into a head batch, requested immediately,
//! and a tail batch where item `i` is requested `i * step` after the tail
//! starts. Every request runs as its own task in a `JoinSet`; one failing or
//! panicking does not affect its siblings, and failures are only logged.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use super::image_cache::ImagePrefetcher;
use crate::domain::{CacheError, ContentItem, ImageFiles};

/// Two-tier prefetch schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchSettings {
    /// URLs requested with no delay
    pub head: usize,

    /// Spacing between tail requests
    pub step: Duration,
}

impl Default for PrefetchSettings {
    fn default() -> Self {
        Self {
            head: 5,
            step: Duration::from_millis(500),
        }
    }
}

/// Outcome counts of one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Image URLs in document order, first occurrence wins
pub fn distinct_image_urls(items: &[ContentItem]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(ContentItem::image_url)
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}

/// Drives an `ImagePrefetcher` over parsed manifest items
#[derive(Clone)]
pub struct PrefetchPipeline {
    prefetcher: Arc<dyn ImagePrefetcher>,
    settings: PrefetchSettings,
}

type PrefetchOutcome = (String, Result<ImageFiles, CacheError>);

impl PrefetchPipeline {
    pub fn new(prefetcher: Arc<dyn ImagePrefetcher>, settings: PrefetchSettings) -> Self {
        Self {
            prefetcher,
            settings,
        }
    }

    /// Start a background run over `items` and return immediately
    pub fn launch(&self, items: &[ContentItem]) -> JoinHandle<PrefetchReport> {
        let urls = distinct_image_urls(items);
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run(urls).await })
    }

    /// Prefetch `urls`: head batch first, then the throttled tail
    pub async fn run(&self, urls: Vec<String>) -> PrefetchReport {
        let mut report = PrefetchReport {
            requested: urls.len(),
            ..Default::default()
        };
        if urls.is_empty() {
            return report;
        }

        let split = self.settings.head.min(urls.len());
        let mut head = urls;
        let tail = head.split_off(split);

        debug!(head = head.len(), tail = tail.len(), "Starting image prefetch");

        let mut batch = JoinSet::new();
        for url in head {
            self.spawn_request(&mut batch, url, Duration::ZERO);
        }
        drain(&mut batch, &mut report).await;

        for (index, url) in tail.into_iter().enumerate() {
            let delay = self.settings.step.saturating_mul(index as u32);
            self.spawn_request(&mut batch, url, delay);
        }
        drain(&mut batch, &mut report).await;

        debug!(
            succeeded = report.succeeded,
            failed = report.failed,
            "Image prefetch finished"
        );
        report
    }

    fn spawn_request(&self, batch: &mut JoinSet<PrefetchOutcome>, url: String, delay: Duration) {
        let prefetcher = Arc::clone(&self.prefetcher);
        batch.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = prefetcher.prefetch(&url).await;
            (url, result)
        });
    }
}

async fn drain(batch: &mut JoinSet<PrefetchOutcome>, report: &mut PrefetchReport) {
    while let Some(joined) = batch.join_next().await {
        match joined {
            Ok((_, Ok(_))) => report.succeeded += 1,
            Ok((url, Err(err))) => {
                warn!(url = %url, error = %err, "Prefetch failed");
                report.failed += 1;
            }
            Err(err) => {
                warn!(error = %err, "Prefetch task aborted");
                report.failed += 1;
            }
        }
    }
}
