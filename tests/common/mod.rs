//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use gallery_cache::{
    CacheError, CacheState, FetchResponse, Fetcher, ImageTransformer, JpegTransformer,
    ManifestRecord, ManifestSource,
};

/// A small valid PNG
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 160, 80]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Fetcher with canned per-resource responses and call counting
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, (u16, Vec<u8>)>>,
    fallback: (u16, Vec<u8>),
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl FakeFetcher {
    /// Every resource answers with `status` and `body`
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            fallback: (status, body.into()),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        }
    }

    /// Every resource is a 300x200 PNG
    pub fn serving_png() -> Self {
        Self::new(200, png_bytes(300, 200))
    }

    /// Every resource is a 404
    pub fn not_found() -> Self {
        Self::new(404, b"not found".to_vec())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(self, resource: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(resource.to_string(), (status, body.into()));
        self
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, resource: &str) -> usize {
        self.calls.lock().unwrap().get(resource).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_bytes(&self, resource: &str) -> anyhow::Result<FetchResponse> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(resource.to_string())
            .or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(resource)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        Ok(FetchResponse::new(status, body))
    }
}

/// Encodes originals normally, fails every preview
pub struct FailingPreviewTransformer;

impl ImageTransformer for FailingPreviewTransformer {
    fn transform(
        &self,
        bytes: &[u8],
        target_size: Option<u32>,
        quality: u8,
    ) -> Result<Vec<u8>, CacheError> {
        match target_size {
            None => JpegTransformer.transform(bytes, None, quality),
            Some(_) => Err(CacheError::Unknown("preview encoder exploded".to_string())),
        }
    }
}

/// Scriptable manifest source driving the facade from tests
pub struct FakeManifestSource {
    state: watch::Sender<CacheState>,
    results: Mutex<VecDeque<Result<ManifestRecord, CacheError>>>,
    calls: AtomicUsize,
}

impl FakeManifestSource {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(CacheState::Empty);
        Arc::new(Self {
            state,
            results: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Queue the result of the next `fetch_record`
    pub fn push_result(&self, result: Result<ManifestRecord, CacheError>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Publish a state as if the manifest cache had transitioned
    pub fn set_state(&self, state: CacheState) {
        self.state.send_replace(state);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManifestSource for FakeManifestSource {
    async fn fetch_record(&self, _force_refresh: bool) -> Result<ManifestRecord, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.results.lock().unwrap().pop_front();
        let result =
            next.unwrap_or_else(|| Err(CacheError::Unknown("No result configured".to_string())));

        match &result {
            Ok(record) => self.set_state(CacheState::ready(record)),
            Err(err) => self.set_state(CacheState::Error(err.clone())),
        }
        result
    }

    fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.state.subscribe()
    }
}
