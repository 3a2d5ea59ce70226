//! In-memory storage engine

use super::StorageEngine;
use crate::error::Result;
use crate::types::{CacheEntry, EntryMeta};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Non-durable engine holding entries in a map. Used by tests and as a
/// process-lifetime cache when no durable medium is wanted.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn write(&self, entry: &CacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.meta.id.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.entries.write().await.remove(id);
        Ok(())
    }

    async fn index(&self) -> Result<Vec<EntryMeta>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .map(|e| e.meta.clone())
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
