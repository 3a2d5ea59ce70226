//! Image Cache Client
//!
//! Cache-first image loading on top of [`image_blob_cache`]: a
//! [`FetchPipeline`] that serves live entries from the store and downloads
//! the rest, a [`CacheClientAdapter`] that drives one image slot through
//! loading, retry with exponential backoff, cancellation and fallback, and a
//! [`BatchPreloader`] for warming many entries at once.

pub mod adapter;
pub mod batch;
pub mod cache;
pub mod local_ref;
pub mod options;
pub mod pipeline;

pub use adapter::{CacheClientAdapter, ImageView, LoadState};
pub use batch::{
    clear_cache, get_cache_stats, BatchPreloader, PreloadItem, PreloadProgress, PreloadSummary,
};
pub use cache::ImageCache;
pub use local_ref::{ImageSource, LocalRefRegistry, LocalReference};
pub use options::{RequestOptions, RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use pipeline::{FetchPipeline, PipelineCountersSnapshot};

pub use image_blob_cache::{CacheConfig, CacheError, CacheStats, ImageCategory};
