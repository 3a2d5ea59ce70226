//! Cache-first image resolution

use crate::local_ref::{LocalRefRegistry, LocalReference};
use chrono::Utc;
use image_blob_cache::{CacheEntry, CacheError, CacheStore, EvictionMaintainer, ImageBlob, ImageCategory, Result};
use image_fetcher::{FetchError, ImageFetcher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hit and fetch counters
#[derive(Debug, Default)]
pub struct PipelineCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    network_fetches: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineCountersSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub network_fetches: u64,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> PipelineCountersSnapshot {
        PipelineCountersSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
        }
    }
}

/// Resolves (url, category) to a renderable reference, from the store when
/// a live entry exists and from the network otherwise.
pub struct FetchPipeline {
    store: Arc<CacheStore>,
    maintainer: EvictionMaintainer,
    fetcher: ImageFetcher,
    refs: Arc<LocalRefRegistry>,
    ttl: Duration,
    counters: PipelineCounters,
}

impl FetchPipeline {
    pub fn new(
        store: Arc<CacheStore>,
        maintainer: EvictionMaintainer,
        fetcher: ImageFetcher,
        refs: Arc<LocalRefRegistry>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            maintainer,
            fetcher,
            refs,
            ttl,
            counters: PipelineCounters::default(),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn refs(&self) -> &Arc<LocalRefRegistry> {
        &self.refs
    }

    pub fn counters(&self) -> PipelineCountersSnapshot {
        self.counters.snapshot()
    }

    /// Resolve to a new local reference. The caller owns it and must revoke it.
    pub async fn resolve(&self, url: &str, category: ImageCategory) -> Result<LocalReference> {
        let blob = self.resolve_blob(url, category).await?;
        Ok(self.refs.create(blob))
    }

    /// Make sure a live entry exists without handing out a reference.
    pub async fn warm(&self, url: &str, category: ImageCategory) -> Result<()> {
        self.resolve_blob(url, category).await.map(|_| ())
    }

    async fn resolve_blob(&self, url: &str, category: ImageCategory) -> Result<ImageBlob> {
        let id = image_blob_cache::derive_key(url, category);

        match self.store.get(&id).await {
            Ok(Some(entry)) if !entry.is_expired(Utc::now()) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %id, "Cache hit");
                return Ok(entry.blob());
            }
            Ok(Some(entry)) => {
                debug!(key = %id, expires_at = %entry.meta.expires_at, "Cache entry expired");
            }
            Ok(None) => {}
            Err(e @ CacheError::StorageUnavailable(_)) => return Err(e),
            Err(e) => {
                warn!(key = %id, error = %e, "Cache read failed, treating as miss");
            }
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        self.counters.network_fetches.fetch_add(1, Ordering::Relaxed);
        let image = self.fetcher.fetch(url).await.map_err(into_cache_error)?;

        let entry = CacheEntry::new(
            url,
            category,
            ImageBlob::new(image.data, image.content_type),
            Utc::now(),
            self.ttl,
        );
        let blob = entry.blob();

        // Persisting runs on its own task so a caller that stops waiting cannot
        // leave a committed put without its maintenance pass
        let store = Arc::clone(&self.store);
        let maintainer = self.maintainer.clone();
        let persist =
            tokio::spawn(async move { maintainer.put_and_maintain(&store, entry).await });

        // The bytes are valid either way; a failed write only costs a refetch
        match persist.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(key = %id, error = %e, "Failed to cache image"),
            Err(e) => warn!(key = %id, error = %e, "Cache write task failed"),
        }

        Ok(blob)
    }
}

fn into_cache_error(err: FetchError) -> CacheError {
    match err {
        FetchError::InvalidContent(content_type) => CacheError::InvalidContent(content_type),
        other => CacheError::NetworkFailure(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Duration as ChronoDuration;
    use image_fetcher::{HttpClient, HttpResponse};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Scripted responses, then a default image forever
    #[derive(Default)]
    pub(crate) struct FakeHttp {
        pub calls: AtomicUsize,
        script: Mutex<VecDeque<image_fetcher::Result<HttpResponse>>>,
        delay: Mutex<Option<Duration>>,
    }

    impl FakeHttp {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push_status(&self, status: u16) {
            self.script.lock().push_back(Ok(HttpResponse {
                status,
                content_type: Some("image/jpeg".to_string()),
                body: Bytes::new(),
            }));
        }

        pub fn push_content_type(&self, content_type: &str) {
            self.script.lock().push_back(Ok(HttpResponse {
                status: 200,
                content_type: Some(content_type.to_string()),
                body: Bytes::from_static(b"<html></html>"),
            }));
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpClient for FakeHttp {
        async fn get(&self, url: &str) -> image_fetcher::Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.script.lock().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(HttpResponse {
                    status: 200,
                    content_type: Some("image/jpeg".to_string()),
                    body: Bytes::from(url.as_bytes().to_vec()),
                })
            })
        }
    }

    pub(crate) async fn pipeline_with(http: Arc<FakeHttp>) -> Arc<FetchPipeline> {
        let store = Arc::new(CacheStore::in_memory());
        store.init().await.unwrap();
        Arc::new(FetchPipeline::new(
            store,
            EvictionMaintainer::default(),
            ImageFetcher::new(http),
            Arc::new(LocalRefRegistry::new()),
            image_blob_cache::types::DEFAULT_TTL,
        ))
    }

    const URL: &str = "https://i.scdn.co/image/artist-1";

    #[tokio::test]
    async fn test_second_request_is_served_from_store() {
        let http = FakeHttp::new();
        let pipeline = pipeline_with(http.clone()).await;

        let first = pipeline.resolve(URL, ImageCategory::Artist).await.unwrap();
        let second = pipeline.resolve(URL, ImageCategory::Artist).await.unwrap();

        assert_eq!(http.calls(), 1);
        assert_eq!(first.blob(), second.blob());
        assert_ne!(first.handle(), second.handle());
        assert_eq!(
            pipeline.counters(),
            PipelineCountersSnapshot {
                hits: 1,
                misses: 1,
                network_fetches: 1
            }
        );
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched_and_replaced() {
        let http = FakeHttp::new();
        let pipeline = pipeline_with(http.clone()).await;

        let long_ago = Utc::now() - ChronoDuration::days(8);
        let stale = CacheEntry::new(
            URL,
            ImageCategory::Artist,
            ImageBlob::new(b"old bytes".to_vec(), "image/jpeg"),
            long_ago,
            image_blob_cache::types::DEFAULT_TTL,
        );
        pipeline.store().put(stale.clone()).await.unwrap();

        let reference = pipeline.resolve(URL, ImageCategory::Artist).await.unwrap();

        assert_eq!(http.calls(), 1);
        assert_eq!(reference.blob().data.as_ref(), URL.as_bytes());
        let stored = pipeline.store().get(stale.id()).await.unwrap().unwrap();
        assert!(stored.meta.created_at > long_ago);
        assert!(!stored.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_categories_are_cached_separately() {
        let http = FakeHttp::new();
        let pipeline = pipeline_with(http.clone()).await;

        pipeline.warm(URL, ImageCategory::Artist).await.unwrap();
        pipeline.warm(URL, ImageCategory::Playlist).await.unwrap();

        assert_eq!(http.calls(), 2);
        assert_eq!(pipeline.store().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_status_error_is_network_failure() {
        let http = FakeHttp::new();
        http.push_status(503);
        let pipeline = pipeline_with(http.clone()).await;

        let err = pipeline.resolve(URL, ImageCategory::User).await.unwrap_err();
        assert!(matches!(err, CacheError::NetworkFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(pipeline.store().len().await.unwrap(), 0);
        assert_eq!(pipeline.refs().live_count(), 0);
    }

    #[tokio::test]
    async fn test_non_image_is_invalid_content() {
        let http = FakeHttp::new();
        http.push_content_type("text/html");
        let pipeline = pipeline_with(http.clone()).await;

        let err = pipeline.resolve(URL, ImageCategory::User).await.unwrap_err();
        assert_eq!(err, CacheError::InvalidContent("text/html".to_string()));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_fast() {
        let http = FakeHttp::new();
        let store = Arc::new(CacheStore::in_memory());
        let pipeline = FetchPipeline::new(
            store,
            EvictionMaintainer::default(),
            ImageFetcher::new(http.clone()),
            Arc::new(LocalRefRegistry::new()),
            image_blob_cache::types::DEFAULT_TTL,
        );

        let err = pipeline.resolve(URL, ImageCategory::Artist).await.unwrap_err();
        assert!(matches!(err, CacheError::StorageUnavailable(_)));
        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn test_write_triggers_maintenance() {
        let http = FakeHttp::new();
        let store = Arc::new(CacheStore::in_memory());
        store.init().await.unwrap();

        // Every fake body is the URL, so these are 11 bytes each
        let pipeline = FetchPipeline::new(
            store.clone(),
            EvictionMaintainer::new(30, 0.2),
            ImageFetcher::new(http),
            Arc::new(LocalRefRegistry::new()),
            image_blob_cache::types::DEFAULT_TTL,
        );
        for url in ["https://a/1", "https://a/2", "https://a/3"] {
            pipeline.warm(url, ImageCategory::Playlist).await.unwrap();
        }

        assert!(store.total_size().await.unwrap() <= 30);
        let remaining = store.scan_oldest_first().await.unwrap();
        assert_eq!(remaining.last().unwrap().source_url, "https://a/3");
    }
}
