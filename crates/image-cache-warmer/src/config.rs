//! Configuration from environment variables

use crate::error::{Result, WarmerError};
use image_blob_cache::CacheConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct WarmerConfig {
    pub cache: CacheConfig,
    pub fetch_timeout: Duration,
}

pub fn load_config() -> Result<WarmerConfig> {
    config_from(|name| std::env::var(name).ok())
}

fn config_from(get: impl Fn(&str) -> Option<String>) -> Result<WarmerConfig> {
    let defaults = CacheConfig::default();

    let cache_dir = get("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let max_cache_size =
        parse_var(&get, "MAX_CACHE_SIZE")?.unwrap_or(defaults.max_cache_size);

    let ttl = parse_var::<u64>(&get, "CACHE_TTL_SECS")?
        .map(Duration::from_secs)
        .unwrap_or(defaults.ttl);

    let fetch_timeout = Duration::from_secs(
        parse_var(&get, "FETCH_TIMEOUT_SECS")?.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
    );

    Ok(WarmerConfig {
        cache: CacheConfig {
            cache_dir,
            max_cache_size,
            ttl,
            eviction_target_ratio: defaults.eviction_target_ratio,
        },
        fetch_timeout,
    })
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    match get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WarmerError::Config(format!("{} must be a number, got {:?}", name, raw))),
    }
}
