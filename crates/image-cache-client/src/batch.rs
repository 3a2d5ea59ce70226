//! Batch preloading and cache-wide utilities

use crate::pipeline::{FetchPipeline, PipelineCountersSnapshot};
use futures::future::join_all;
use image_blob_cache::{CacheStats, CacheStore, ImageCategory, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadItem {
    pub url: String,
    pub category: ImageCategory,
}

impl PreloadItem {
    pub fn new(url: impl Into<String>, category: ImageCategory) -> Self {
        Self {
            url: url.into(),
            category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreloadProgress {
    pub is_preloading: bool,
    /// Settled fraction in [0, 1]
    pub preload_progress: f64,
}

impl Default for PreloadProgress {
    fn default() -> Self {
        Self {
            is_preloading: false,
            preload_progress: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Warms many entries concurrently and reports progress as they settle.
pub struct BatchPreloader {
    pipeline: Arc<FetchPipeline>,
    progress: watch::Sender<PreloadProgress>,
}

impl BatchPreloader {
    pub fn new(pipeline: Arc<FetchPipeline>) -> Self {
        let (progress, _) = watch::channel(PreloadProgress::default());
        Self { pipeline, progress }
    }

    pub fn progress(&self) -> PreloadProgress {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreloadProgress> {
        self.progress.subscribe()
    }

    /// Warm every item. Individual failures are logged and counted, never
    /// propagated. Progress ends at 1.0, an empty batch included.
    pub async fn preload_images(&self, items: &[PreloadItem]) -> PreloadSummary {
        let total = items.len();
        self.progress.send_replace(PreloadProgress {
            is_preloading: true,
            preload_progress: 0.0,
        });

        let settled = AtomicUsize::new(0);
        let outcomes = join_all(items.iter().map(|item| {
            let settled = &settled;
            async move {
                let result = self.pipeline.warm(&item.url, item.category).await;
                if let Err(e) = &result {
                    warn!(url = %item.url, category = %item.category, error = %e, "Preload failed");
                }
                let done = settled.fetch_add(1, Ordering::SeqCst) + 1;
                self.progress.send_modify(|p| {
                    p.preload_progress = done as f64 / total as f64;
                });
                result.is_ok()
            }
        }))
        .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let summary = PreloadSummary {
            succeeded,
            failed: total - succeeded,
        };

        self.progress.send_replace(PreloadProgress {
            is_preloading: false,
            preload_progress: 1.0,
        });
        info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Preload batch finished"
        );

        summary
    }
}

/// Snapshot of what is stored. A store failure yields empty stats.
pub async fn get_cache_stats(store: &CacheStore, counters: PipelineCountersSnapshot) -> CacheStats {
    match store.entries().await {
        Ok(entries) => {
            let mut stats = CacheStats::from_entries(&entries);
            stats.hits = counters.hits;
            stats.misses = counters.misses;
            stats
        }
        Err(e) => {
            warn!(error = %e, "Failed to read cache stats");
            CacheStats::default()
        }
    }
}

/// Remove every entry. Unlike stats, failures are reported.
pub async fn clear_cache(store: &CacheStore) -> Result<()> {
    store.clear().await
}
