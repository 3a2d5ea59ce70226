//! Durable, serialized cache store
//!
//! Wraps a [`StorageEngine`] with the secondary orderings the eviction pass
//! needs (creation time, expiry, category). Every operation holds one async
//! mutex for its whole duration, so concurrent callers never observe a torn
//! write or an index that disagrees with the engine.

use crate::engine::{FileEngine, MemoryEngine, StorageEngine};
use crate::error::{CacheError, Result};
use crate::types::{CacheEntry, EntryMeta, ImageCategory};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// In-memory orderings over the engine's contents
#[derive(Debug, Default)]
struct Index {
    by_id: HashMap<String, (EntryMeta, u64)>,
    by_created: BTreeSet<(DateTime<Utc>, u64, String)>,
    by_expiry: BTreeSet<(DateTime<Utc>, String)>,
    by_category: HashMap<ImageCategory, HashSet<String>>,
    total_size: u64,
    /// Breaks `created_at` ties so oldest-first follows insertion order
    next_seq: u64,
}

impl Index {
    fn build(mut metas: Vec<EntryMeta>) -> Self {
        metas.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let mut index = Index::default();
        for meta in metas {
            index.insert(meta);
        }
        index
    }

    fn insert(&mut self, meta: EntryMeta) {
        self.remove(&meta.id);

        let seq = self.next_seq;
        self.next_seq += 1;

        self.by_created
            .insert((meta.created_at, seq, meta.id.clone()));
        self.by_expiry.insert((meta.expires_at, meta.id.clone()));
        self.by_category
            .entry(meta.category)
            .or_default()
            .insert(meta.id.clone());
        self.total_size += meta.size_bytes;
        self.by_id.insert(meta.id.clone(), (meta, seq));
    }

    fn remove(&mut self, id: &str) -> Option<EntryMeta> {
        let (meta, seq) = self.by_id.remove(id)?;

        self.by_created
            .remove(&(meta.created_at, seq, meta.id.clone()));
        self.by_expiry.remove(&(meta.expires_at, meta.id.clone()));
        if let Some(ids) = self.by_category.get_mut(&meta.category) {
            ids.remove(&meta.id);
        }
        self.total_size = self.total_size.saturating_sub(meta.size_bytes);
        Some(meta)
    }

    fn meta(&self, id: &str) -> Option<&EntryMeta> {
        self.by_id.get(id).map(|(meta, _)| meta)
    }
}

/// Key to entry table with orderings by category, creation time and expiry
pub struct CacheStore {
    engine: Arc<dyn StorageEngine>,
    /// `None` until `init` succeeds and again after `close`
    index: Mutex<Option<Index>>,
}

impl CacheStore {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            index: Mutex::new(None),
        }
    }

    /// Store backed by a directory on disk
    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileEngine::new(dir)))
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryEngine::new()))
    }

    /// Open the engine and rebuild the orderings. Calling it again is a no-op.
    pub async fn init(&self) -> Result<()> {
        let mut guard = self.index.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        self.engine.open().await?;
        let metas = self.engine.index().await?;
        let index = Index::build(metas);
        info!(
            entries = index.by_id.len(),
            total_size = index.total_size,
            "Cache store initialized"
        );
        *guard = Some(index);
        Ok(())
    }

    pub async fn is_open(&self) -> bool {
        self.index.lock().await.is_some()
    }

    /// Entry for `id` whether or not it has expired. A corrupt entry is
    /// deleted and reported as a miss.
    pub async fn get(&self, id: &str) -> Result<Option<CacheEntry>> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;

        match self.engine.read(id).await {
            Ok(Some(entry)) => Ok(Some(entry)),
            Ok(None) => {
                if index.remove(id).is_some() {
                    debug!(key = %id, "Entry vanished from engine, dropping from index");
                }
                Ok(None)
            }
            Err(CacheError::CorruptEntry(_)) => {
                warn!(key = %id, "Corrupt cache entry, deleting");
                if let Err(e) = self.engine.remove(id).await {
                    warn!(key = %id, error = %e, "Failed to delete corrupt cache entry");
                }
                index.remove(id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Insert or replace. A replacement gets a fresh position in the
    /// oldest-first ordering.
    pub async fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;

        self.engine.write(&entry).await?;
        debug!(key = %entry.meta.id, size = entry.meta.size_bytes, "Stored cache entry");
        index.insert(entry.meta);
        Ok(())
    }

    /// Remove an entry; absent ids are a no-op.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;

        self.engine.remove(id).await?;
        if index.remove(id).is_some() {
            debug!(key = %id, "Deleted cache entry");
        }
        Ok(())
    }

    /// Headers of every entry with `expires_at <= now`
    pub async fn scan_expired(&self, now: DateTime<Utc>) -> Result<Vec<EntryMeta>> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;

        Ok(index
            .by_expiry
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= now)
            .filter_map(|(_, id)| index.meta(id).cloned())
            .collect())
    }

    /// Headers ordered by ascending `created_at`
    pub async fn scan_oldest_first(&self) -> Result<Vec<EntryMeta>> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;

        Ok(index
            .by_created
            .iter()
            .filter_map(|(_, _, id)| index.meta(id).cloned())
            .collect())
    }

    /// Headers of every entry in a category
    pub async fn scan_category(&self, category: ImageCategory) -> Result<Vec<EntryMeta>> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;

        Ok(index
            .by_category
            .get(&category)
            .map(|ids| ids.iter().filter_map(|id| index.meta(id).cloned()).collect())
            .unwrap_or_default())
    }

    /// Headers of every entry
    pub async fn entries(&self) -> Result<Vec<EntryMeta>> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;
        Ok(index.by_id.values().map(|(meta, _)| meta.clone()).collect())
    }

    pub async fn total_size(&self) -> Result<u64> {
        let mut guard = self.index.lock().await;
        Ok(opened(&mut guard)?.total_size)
    }

    pub async fn len(&self) -> Result<usize> {
        let mut guard = self.index.lock().await;
        Ok(opened(&mut guard)?.by_id.len())
    }

    pub async fn clear(&self) -> Result<()> {
        let mut guard = self.index.lock().await;
        let index = opened(&mut guard)?;

        self.engine.clear().await?;
        let removed = index.by_id.len();
        *index = Index::default();
        info!(removed, "Cache cleared");
        Ok(())
    }

    /// Close the engine. Further operations fail until `init` runs again.
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.index.lock().await;
        if guard.take().is_some() {
            self.engine.close().await?;
            debug!("Cache store closed");
        }
        Ok(())
    }
}

fn opened(guard: &mut Option<Index>) -> Result<&mut Index> {
    guard
        .as_mut()
        .ok_or_else(|| CacheError::StorageUnavailable("cache store is not open".to_string()))
}
