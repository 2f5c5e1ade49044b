//! Manifest Cache Integration Tests
//!
//! Single-flight fetching, TTL decisions, and error propagation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeFetcher;
use gallery_cache::config::paths;
use gallery_cache::core::epoch_ms;
use gallery_cache::{CacheError, CacheState, ManifestCache, ManifestSettings, ManifestSource};
use tempfile::TempDir;

const URL: &str = "https://example.com/test/images.txt";
const HOUR_MS: i64 = 60 * 60 * 1000;

fn cache_with(temp: &TempDir, fetcher: Arc<FakeFetcher>) -> ManifestCache {
    ManifestCache::new(temp.path(), ManifestSettings::new(URL), fetcher)
}

fn write_record(temp: &TempDir, content: &str, fetched_at_ms: i64) {
    std::fs::write(paths::manifest_file(temp.path()), content).unwrap();
    std::fs::write(
        paths::manifest_meta_file(temp.path()),
        fetched_at_ms.to_string(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_network_call() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(
        FakeFetcher::new(200, "https://x.com/a.jpg\nhello").with_delay(Duration::from_millis(100)),
    );
    let cache = cache_with(&temp, fetcher.clone());

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move { cache.fetch(false).await }));
    }

    for task in tasks {
        let content = task.await.unwrap().unwrap();
        assert_eq!(content, "https://x.com/a.jpg\nhello");
    }

    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_failing_fetches_share_one_network_call() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::new(503, "unavailable").with_delay(Duration::from_millis(100)));
    let cache = cache_with(&temp, fetcher.clone());

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch(false).await })
        })
        .collect();

    let mut errors = Vec::new();
    for task in tasks {
        errors.push(task.await.unwrap().unwrap_err());
    }

    assert_eq!(fetcher.total_calls(), 1);
    assert!(matches!(errors[0], CacheError::Network(_)));
    assert!(errors.iter().all(|e| e == &errors[0]));
}

#[tokio::test]
async fn test_concurrent_fetches_resolve_to_one_record() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::new(200, "a\nb").with_delay(Duration::from_millis(50)));
    let cache = cache_with(&temp, fetcher.clone());

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch_record(false).await })
        })
        .collect();

    let mut records = Vec::new();
    for task in tasks {
        records.push(task.await.unwrap().unwrap());
    }

    // One attempt means one Ready timestamp for every caller
    assert!(records.iter().all(|r| r == &records[0]));
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_non_forced_caller_joins_in_flight_forced_fetch() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::new(200, "fresh").with_delay(Duration::from_millis(100)));
    let cache = cache_with(&temp, fetcher.clone());

    let forced = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.fetch_record(true).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let joined = cache.fetch_record(false).await.unwrap();
    let forced = forced.await.unwrap().unwrap();

    assert_eq!(joined, forced);
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_stale_record_is_refetched() {
    let temp = TempDir::new().unwrap();
    write_record(&temp, "old content", epoch_ms() - 25 * HOUR_MS);

    let fetcher = Arc::new(FakeFetcher::new(200, "new content"));
    let cache = cache_with(&temp, fetcher.clone());

    assert_eq!(cache.fetch(false).await.unwrap(), "new content");
    assert_eq!(fetcher.total_calls(), 1);

    let persisted = std::fs::read_to_string(paths::manifest_file(temp.path())).unwrap();
    assert_eq!(persisted, "new content");
}

#[tokio::test]
async fn test_fresh_record_is_served_from_disk() {
    let temp = TempDir::new().unwrap();
    write_record(&temp, "old content", epoch_ms() - HOUR_MS);

    let fetcher = Arc::new(FakeFetcher::new(200, "new content"));
    let cache = cache_with(&temp, fetcher.clone());

    assert_eq!(cache.fetch(false).await.unwrap(), "old content");
    assert_eq!(fetcher.total_calls(), 0);
    assert!(matches!(cache.current_state(), CacheState::Ready { .. }));
}

#[tokio::test]
async fn test_custom_ttl_is_honored() {
    let temp = TempDir::new().unwrap();
    write_record(&temp, "old content", epoch_ms() - 2 * HOUR_MS);

    let fetcher = Arc::new(FakeFetcher::new(200, "new content"));
    let settings = ManifestSettings {
        url: URL.to_string(),
        ttl: Duration::from_secs(60 * 60),
    };
    let cache = ManifestCache::new(temp.path(), settings, fetcher.clone());

    assert_eq!(cache.fetch(false).await.unwrap(), "new content");
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_force_refresh_ignores_fresh_record() {
    let temp = TempDir::new().unwrap();
    write_record(&temp, "old content", epoch_ms() - HOUR_MS);

    let fetcher = Arc::new(FakeFetcher::new(200, "new content"));
    let cache = cache_with(&temp, fetcher.clone());

    assert_eq!(cache.fetch(true).await.unwrap(), "new content");
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_joiner_receives_in_flight_failure() {
    let temp = TempDir::new().unwrap();
    let fetcher =
        Arc::new(FakeFetcher::new(503, "unavailable").with_delay(Duration::from_millis(200)));
    let cache = cache_with(&temp, fetcher.clone());

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.fetch(false).await })
    };

    // Let the first fetch get under way
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(cache.current_state(), CacheState::Loading);

    let joined = cache.fetch(false).await;
    let first = first.await.unwrap();

    assert!(matches!(first, Err(CacheError::Network(_))));
    assert_eq!(joined, first);
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn test_forced_fetch_does_not_join_in_flight() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::new(200, "content").with_delay(Duration::from_millis(100)));
    let cache = cache_with(&temp, fetcher.clone());

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.fetch(false).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    cache.fetch(true).await.unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test]
async fn test_retry_after_failure_hits_network_again() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::new(500, "boom"));
    let cache = cache_with(&temp, fetcher.clone());

    assert!(cache.fetch(false).await.is_err());
    assert!(matches!(cache.current_state(), CacheState::Error(CacheError::Network(_))));

    assert!(cache.fetch(false).await.is_err());
    assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test]
async fn test_dropped_caller_does_not_strand_joiners() {
    let temp = TempDir::new().unwrap();
    let fetcher = Arc::new(FakeFetcher::new(200, "content").with_delay(Duration::from_millis(150)));
    let cache = cache_with(&temp, fetcher.clone());

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.fetch(false).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    first.abort();

    let content = tokio::time::timeout(Duration::from_secs(2), cache.fetch(false))
        .await
        .expect("joiner should not hang")
        .unwrap();
    assert_eq!(content, "content");
    assert_eq!(fetcher.total_calls(), 1);
}
