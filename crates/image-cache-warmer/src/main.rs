//! Image Cache Warmer
//!
//! Reads `<category> <url>` lines from stdin, downloads every image into the
//! durable cache and prints the resulting cache statistics as JSON.

mod config;
mod error;
mod input;

use crate::config::load_config;
use crate::error::Result;
use image_cache_client::ImageCache;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("image_cache_warmer=info".parse()?)
        .add_directive("image_cache_client=info".parse()?)
        .add_directive("image_blob_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let config = load_config()?;
    info!("Cache dir: {}", config.cache.cache_dir.display());
    info!("Max cache size: {} bytes", config.cache.max_cache_size);

    let items = input::read_items(BufReader::new(tokio::io::stdin())).await?;
    info!("Warming {} images", items.len());

    let cache = ImageCache::open(config.cache, config.fetch_timeout).await;
    let summary = cache.preloader().preload_images(&items).await;
    if summary.failed > 0 {
        warn!("{} of {} images failed to load", summary.failed, items.len());
    }

    let stats = cache.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    cache.close().await?;
    Ok(())
}
