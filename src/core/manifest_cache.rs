//! Single-flight manifest cache with TTL refresh.
//!
//! The manifest is persisted as two sibling files: the payload, then a
//! timestamp marker. A missing or unparseable marker means "stale".
//!
//! Concurrency:
//! - The current attempt is a shared handle in `pending`. A non-forced
//!   caller either clones that handle or installs a new one, in one step
//!   under the `pending` lock, so N concurrent callers start one attempt.
//! - A forced caller always starts a new attempt and installs it as the
//!   current one; later non-forced callers join the newest attempt.
//! - Attempt bodies are serialized on `fetch_lock`, covering the
//!   network-or-disk decision, the transfer, and the persisted writes.
//! - Each attempt runs in its own task, so a caller that goes away does not
//!   strand the others.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::fs;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::epoch_ms;
use crate::adapters::Fetcher;
use crate::config::paths;
use crate::domain::{CacheError, CacheState, ManifestRecord};

/// Manifest location and freshness window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSettings {
    /// Absolute URL of the manifest
    pub url: String,

    /// Persisted records older than this are refetched
    pub ttl: Duration,
}

impl ManifestSettings {
    /// 24 hours
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ttl: Self::DEFAULT_TTL,
        }
    }
}

/// Where the content facade gets manifest text and state changes from
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the manifest, honoring single-flight and TTL rules
    async fn fetch_record(&self, force_refresh: bool) -> Result<ManifestRecord, CacheError>;

    /// Observe state transitions; always holds the latest state
    fn subscribe(&self) -> watch::Receiver<CacheState>;
}

type SharedFetch = Shared<BoxFuture<'static, Result<ManifestRecord, CacheError>>>;

/// The attempt callers currently join, tagged so only its own task clears it
struct Attempt {
    generation: u64,
    fetch: SharedFetch,
}

/// Manifest cache handle (cheap to clone)
#[derive(Clone)]
pub struct ManifestCache {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ManifestSettings,
    fetcher: Arc<dyn Fetcher>,
    payload_path: PathBuf,
    meta_path: PathBuf,
    fetch_lock: Arc<Mutex<()>>,
    /// Current attempt and the generation counter; both change under this lock
    pending: Mutex<(u64, Option<Attempt>)>,
    state: watch::Sender<CacheState>,
}

impl ManifestCache {
    /// Create a cache persisting under `home`
    pub fn new(home: &Path, settings: ManifestSettings, fetcher: Arc<dyn Fetcher>) -> Self {
        let (state, _) = watch::channel(CacheState::Empty);

        Self {
            inner: Arc::new(Inner {
                settings,
                fetcher,
                payload_path: paths::manifest_file(home),
                meta_path: paths::manifest_meta_file(home),
                fetch_lock: Arc::new(Mutex::new(())),
                pending: Mutex::new((0, None)),
                state,
            }),
        }
    }

    /// Fetch the manifest text
    pub async fn fetch(&self, force_refresh: bool) -> Result<String, CacheError> {
        self.fetch_record(force_refresh)
            .await
            .map(|record| record.content)
    }

    /// Snapshot of the current state
    pub fn current_state(&self) -> CacheState {
        self.inner.state.borrow().clone()
    }

    async fn fetch_shared(&self, force_refresh: bool) -> Result<ManifestRecord, CacheError> {
        let fetch = {
            let mut pending = self.inner.pending.lock().await;
            let (generation, current) = &mut *pending;

            let joined = match current.as_ref() {
                Some(attempt) if !force_refresh => {
                    debug!(generation = attempt.generation, "Joining in-flight manifest fetch");
                    Some(attempt.fetch.clone())
                }
                _ => None,
            };

            match joined {
                Some(fetch) => fetch,
                None => {
                    *generation += 1;
                    let fetch = Inner::spawn_attempt(Arc::clone(&self.inner), *generation, force_refresh);
                    *current = Some(Attempt {
                        generation: *generation,
                        fetch: fetch.clone(),
                    });
                    fetch
                }
            }
        };

        fetch.await
    }
}

#[async_trait]
impl ManifestSource for ManifestCache {
    async fn fetch_record(&self, force_refresh: bool) -> Result<ManifestRecord, CacheError> {
        self.fetch_shared(force_refresh).await
    }

    fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.inner.state.subscribe()
    }
}

impl Inner {
    /// Run one attempt in its own task and hand back a joinable handle
    fn spawn_attempt(inner: Arc<Inner>, generation: u64, force_refresh: bool) -> SharedFetch {
        let handle = tokio::spawn(async move {
            let result = {
                let _guard = Arc::clone(&inner.fetch_lock).lock_owned().await;
                inner.run_fetch(force_refresh).await
            };

            let mut pending = inner.pending.lock().await;
            if pending.1.as_ref().map(|a| a.generation) == Some(generation) {
                pending.1 = None;
            }
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(CacheError::Unknown(format!("Manifest fetch task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    /// One attempt; caller holds `fetch_lock`
    async fn run_fetch(&self, force_refresh: bool) -> Result<ManifestRecord, CacheError> {
        self.set_state(CacheState::Loading);

        let result = AssertUnwindSafe(self.load(force_refresh))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(CacheError::Unknown("Manifest fetch panicked".to_string())));

        match &result {
            Ok(record) => self.set_state(CacheState::ready(record)),
            Err(err) => {
                warn!(error = %err, "Manifest fetch failed");
                self.set_state(CacheState::Error(err.clone()));
            }
        }

        result
    }

    async fn load(&self, force_refresh: bool) -> Result<ManifestRecord, CacheError> {
        let now = epoch_ms();

        if !force_refresh {
            match self.read_persisted().await {
                Some(record) if !self.is_stale(&record, now) => {
                    debug!(age_ms = record.age_ms(now), "Serving persisted manifest");
                    return Ok(ManifestRecord::new(record.content, now));
                }
                Some(record) => debug!(age_ms = record.age_ms(now), "Persisted manifest is stale"),
                None => debug!("No valid persisted manifest"),
            }
        }

        self.fetch_from_network().await
    }

    fn is_stale(&self, record: &ManifestRecord, now_ms: i64) -> bool {
        record.age_ms(now_ms) as u128 > self.settings.ttl.as_millis()
    }

    /// Payload + marker, or None if either is missing or unreadable
    async fn read_persisted(&self) -> Option<ManifestRecord> {
        let marker = fs::read_to_string(&self.meta_path).await.ok()?;
        let fetched_at_ms = match marker.trim().parse::<i64>() {
            Ok(ts) => ts,
            Err(_) => {
                warn!(path = %self.meta_path.display(), "Unparseable manifest marker");
                return None;
            }
        };

        let content = fs::read_to_string(&self.payload_path).await.ok()?;
        Some(ManifestRecord::new(content, fetched_at_ms))
    }

    async fn fetch_from_network(&self) -> Result<ManifestRecord, CacheError> {
        let url = &self.settings.url;
        info!(url = %url, fetcher = self.fetcher.name(), "Fetching manifest");

        let response = self
            .fetcher
            .fetch_bytes(url)
            .await
            .map_err(|e| CacheError::network(&e))?;

        let body = response.into_body(url)?;
        let content = String::from_utf8(body)
            .map_err(|e| CacheError::Unknown(format!("Manifest is not valid UTF-8: {}", e)))?;

        let record = ManifestRecord::new(content, epoch_ms());
        self.persist(&record).await?;

        info!(bytes = record.content.len(), "Manifest persisted");
        Ok(record)
    }

    /// Payload first, marker second
    async fn persist(&self, record: &ManifestRecord) -> Result<(), CacheError> {
        if let Some(parent) = self.payload_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&self.payload_path, &record.content).await?;
        fs::write(&self.meta_path, record.fetched_at_ms.to_string()).await?;

        Ok(())
    }

    fn set_state(&self, next: CacheState) {
        self.state.send_if_modified(|current| {
            if current.accepts(&next) {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}
