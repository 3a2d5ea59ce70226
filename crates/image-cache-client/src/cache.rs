//! Wiring for one cache instance

use crate::adapter::CacheClientAdapter;
use crate::batch::{clear_cache, get_cache_stats, BatchPreloader};
use crate::local_ref::LocalRefRegistry;
use crate::pipeline::FetchPipeline;
use image_blob_cache::{
    CacheConfig, CacheStats, CacheStore, EvictionMaintainer, FileEngine, Result, StorageEngine,
};
use image_fetcher::ImageFetcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Store, pipeline and reference registry shared by every adapter and
/// preloader handed out.
pub struct ImageCache {
    config: CacheConfig,
    pipeline: Arc<FetchPipeline>,
}

impl ImageCache {
    /// Durable cache under `config.cache_dir`, downloading with reqwest.
    pub async fn open(config: CacheConfig, fetch_timeout: Duration) -> Self {
        let engine = Arc::new(FileEngine::new(config.cache_dir.clone()));
        Self::with_parts(config, engine, ImageFetcher::with_timeout(fetch_timeout)).await
    }

    /// Build over any engine and fetcher.
    ///
    /// If the store cannot be opened the cache still works: every request
    /// fails fast with `StorageUnavailable` and adapters render the remote URL.
    pub async fn with_parts(
        config: CacheConfig,
        engine: Arc<dyn StorageEngine>,
        fetcher: ImageFetcher,
    ) -> Self {
        let store = Arc::new(CacheStore::new(engine));
        let maintainer = EvictionMaintainer::from_config(&config);

        match store.init().await {
            Ok(()) => {
                // Entries may have expired while the process was down
                maintainer.run(&store).await;
            }
            Err(e) => {
                warn!(
                    dir = %config.cache_dir.display(),
                    error = %e,
                    "Image cache unavailable, serving remote URLs"
                );
            }
        }

        let pipeline = Arc::new(FetchPipeline::new(
            store,
            maintainer,
            fetcher,
            Arc::new(LocalRefRegistry::new()),
            config.ttl,
        ));

        Self { config, pipeline }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<FetchPipeline> {
        &self.pipeline
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        self.pipeline.store()
    }

    pub fn refs(&self) -> &Arc<LocalRefRegistry> {
        self.pipeline.refs()
    }

    /// A new image slot
    pub fn adapter(&self) -> CacheClientAdapter {
        CacheClientAdapter::new(Arc::clone(&self.pipeline))
    }

    pub fn preloader(&self) -> BatchPreloader {
        BatchPreloader::new(Arc::clone(&self.pipeline))
    }

    pub async fn stats(&self) -> CacheStats {
        get_cache_stats(self.store(), self.pipeline.counters()).await
    }

    pub async fn clear(&self) -> Result<()> {
        clear_cache(self.store()).await
    }

    pub async fn close(&self) -> Result<()> {
        self.store().close().await
    }
}
