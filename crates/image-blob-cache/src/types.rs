//! Cache types

use crate::key::derive_key;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default size budget: 100 MB
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Default entry lifetime: 7 days
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Share of the size budget a size purge frees
pub const DEFAULT_EVICTION_TARGET_RATIO: f64 = 0.20;

/// Namespace for cached images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Artist,
    Playlist,
    User,
}

impl ImageCategory {
    pub const ALL: [ImageCategory; 3] = [
        ImageCategory::Artist,
        ImageCategory::Playlist,
        ImageCategory::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCategory::Artist => "artist",
            ImageCategory::Playlist => "playlist",
            ImageCategory::User => "user",
        }
    }
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" => Ok(ImageCategory::Artist),
            "playlist" => Ok(ImageCategory::Playlist),
            "user" => Ok(ImageCategory::User),
            other => Err(format!("unknown image category: {}", other)),
        }
    }
}

/// Image bytes plus their declared content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub data: Bytes,
    pub content_type: String,
}

impl ImageBlob {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }
}

/// Header of a cached entry, everything except the blob bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub id: String,
    pub source_url: String,
    pub category: ImageCategory,
    pub content_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EntryMeta {
    /// An entry is dead once `expires_at <= now`, purged or not.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A cached image. Entries are never mutated, only replaced or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub meta: EntryMeta,
    pub data: Bytes,
}

impl CacheEntry {
    /// Build a fresh entry created at `now` that lives for `ttl`.
    pub fn new(
        source_url: &str,
        category: ImageCategory,
        blob: ImageBlob,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let meta = EntryMeta {
            id: derive_key(source_url, category),
            source_url: source_url.to_string(),
            category,
            content_type: blob.content_type,
            size_bytes: blob.data.len() as u64,
            created_at: now,
            expires_at: expiry_for(now, ttl),
        };
        Self {
            meta,
            data: blob.data,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.meta.is_expired(now)
    }

    pub fn blob(&self) -> ImageBlob {
        ImageBlob {
            data: self.data.clone(),
            content_type: self.meta.content_type.clone(),
        }
    }
}

/// `created_at + ttl`, saturating at the largest representable time
pub fn expiry_for(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Configuration for the image cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub max_cache_size: u64,
    pub ttl: Duration,
    pub eviction_target_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/images"),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            ttl: DEFAULT_TTL,
            eviction_target_ratio: DEFAULT_EVICTION_TARGET_RATIO,
        }
    }
}

/// Count and size of the entries in one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: usize,
    pub size: u64,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_images: usize,
    pub total_size: u64,
    pub size_by_type: BTreeMap<ImageCategory, CategoryStats>,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Aggregate headers into totals, overall and per category.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a EntryMeta>) -> Self {
        let mut stats = CacheStats::default();
        for entry in entries {
            stats.total_images += 1;
            stats.total_size += entry.size_bytes;
            let bucket = stats.size_by_type.entry(entry.category).or_default();
            bucket.count += 1;
            bucket.size += entry.size_bytes;
        }
        stats
    }
}
