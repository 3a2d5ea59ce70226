//! Storage engine boundary
//!
//! The durable medium behind [`crate::CacheStore`]. Engines only move whole
//! records; ordering, size accounting and transaction discipline live in the
//! store.

mod file;
mod memory;

pub use file::FileEngine;
pub use memory::MemoryEngine;

use crate::error::Result;
use crate::types::{CacheEntry, EntryMeta};
use async_trait::async_trait;

#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Open or create the backing schema. Must be idempotent.
    async fn open(&self) -> Result<()>;

    /// Read a full entry. A record that cannot be decoded is `CorruptEntry`.
    async fn read(&self, id: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace an entry as a single unit.
    async fn write(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove an entry; absent ids are not an error.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Headers of every decodable entry.
    async fn index(&self) -> Result<Vec<EntryMeta>>;

    async fn clear(&self) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
