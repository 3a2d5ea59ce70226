//! Durable image blob cache with TTL expiration and oldest-first eviction
//!
//! Stores downloaded images keyed by (source URL, category) behind a narrow
//! [`StorageEngine`] boundary. The [`CacheStore`] serializes every operation
//! and keeps secondary orderings by category, creation time and expiry; the
//! [`EvictionMaintainer`] purges expired entries and enforces the size budget
//! after each write.

pub mod engine;
pub mod error;
pub mod eviction;
pub mod key;
pub mod store;
pub mod types;

pub use engine::{FileEngine, MemoryEngine, StorageEngine};
pub use error::{CacheError, Result};
pub use eviction::{EvictionMaintainer, EvictionReport};
pub use key::derive_key;
pub use store::CacheStore;
pub use types::{
    CacheConfig, CacheEntry, CacheStats, CategoryStats, EntryMeta, ImageBlob, ImageCategory,
};
