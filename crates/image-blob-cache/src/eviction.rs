//! Post-write maintenance: expired purge, then size enforcement

use crate::error::Result;
use crate::store::CacheStore;
use crate::types::{CacheConfig, CacheEntry, DEFAULT_EVICTION_TARGET_RATIO, DEFAULT_MAX_CACHE_SIZE};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub expired_removed: usize,
    pub size_removed: usize,
    pub bytes_freed: u64,
    pub total_before: u64,
    pub total_after: u64,
}

/// Keeps the store free of expired entries and within its size budget.
///
/// Oldest-first by `created_at` stands in for least-recently-used: hits do
/// not refresh entries, and the entry that triggered the pass is always the
/// newest, so it only goes if it alone blows the budget.
#[derive(Debug, Clone)]
pub struct EvictionMaintainer {
    max_cache_size: u64,
    target_ratio: f64,
}

impl EvictionMaintainer {
    pub fn new(max_cache_size: u64, target_ratio: f64) -> Self {
        Self {
            max_cache_size,
            target_ratio: target_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_cache_size, config.eviction_target_ratio)
    }

    pub fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    /// Bytes a size purge must free: a share of the capacity, not of usage
    pub fn free_target(&self) -> u64 {
        (self.max_cache_size as f64 * self.target_ratio).ceil() as u64
    }

    /// Store `entry`, then run a maintenance pass.
    ///
    /// Post-condition: when this returns `Ok`, the entry is committed and a
    /// pass has already run against the store that includes it. Maintenance
    /// failures are logged and never fail the write.
    ///
    /// Dropping the future part way through can leave a committed entry with
    /// no pass after it; cancellable callers should run this on its own task.
    pub async fn put_and_maintain(&self, store: &CacheStore, entry: CacheEntry) -> Result<EvictionReport> {
        store.put(entry).await?;
        Ok(self.run(store).await)
    }

    /// Best-effort pass. Storage errors are logged and swallowed.
    pub async fn run(&self, store: &CacheStore) -> EvictionReport {
        self.run_at(store, Utc::now()).await
    }

    pub async fn run_at(&self, store: &CacheStore, now: DateTime<Utc>) -> EvictionReport {
        match self.try_run(store, now).await {
            Ok(report) => {
                if report.expired_removed > 0 || report.size_removed > 0 {
                    info!(
                        expired_removed = report.expired_removed,
                        size_removed = report.size_removed,
                        bytes_freed = report.bytes_freed,
                        total_after = report.total_after,
                        "Cache maintenance evicted entries"
                    );
                }
                report
            }
            Err(e) => {
                warn!(error = %e, "Cache maintenance failed");
                EvictionReport::default()
            }
        }
    }

    async fn try_run(&self, store: &CacheStore, now: DateTime<Utc>) -> Result<EvictionReport> {
        let mut report = EvictionReport::default();

        for meta in store.scan_expired(now).await? {
            match store.delete(&meta.id).await {
                Ok(()) => {
                    debug!(key = %meta.id, "Purged expired cache entry");
                    report.expired_removed += 1;
                    report.bytes_freed += meta.size_bytes;
                }
                Err(e) => warn!(key = %meta.id, error = %e, "Failed to purge expired entry"),
            }
        }

        let size = store.total_size().await?;
        report.total_before = size;
        report.total_after = size;

        if size <= self.max_cache_size {
            return Ok(report);
        }

        let target = self.free_target();
        let mut freed = 0u64;

        for meta in store.scan_oldest_first().await? {
            if freed >= target {
                break;
            }
            match store.delete(&meta.id).await {
                Ok(()) => {
                    debug!(key = %meta.id, size = meta.size_bytes, "Evicted oldest cache entry");
                    freed += meta.size_bytes;
                    report.size_removed += 1;
                }
                Err(e) => warn!(key = %meta.id, error = %e, "Failed to evict cache entry"),
            }
        }

        report.bytes_freed += freed;
        report.total_after = store.total_size().await?;
        Ok(report)
    }
}

impl Default for EvictionMaintainer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_SIZE, DEFAULT_EVICTION_TARGET_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryEngine, StorageEngine};
    use crate::error::CacheError;
    use crate::types::{EntryMeta, ImageBlob, ImageCategory, DEFAULT_TTL};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Arc;

    const MB: u64 = 1024 * 1024;

    fn entry_at(name: &str, size: usize, created_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(
            &format!("https://example.com/{}.jpg", name),
            ImageCategory::Artist,
            ImageBlob::new(vec![0u8; size], "image/jpeg"),
            created_at,
            DEFAULT_TTL,
        )
    }

    async fn open_store() -> CacheStore {
        let store = CacheStore::in_memory();
        store.init().await.unwrap();
        store
    }

    async fn ids(store: &CacheStore) -> Vec<String> {
        store
            .scan_oldest_first()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect()
    }

    #[test]
    fn test_free_target_is_share_of_capacity() {
        assert_eq!(EvictionMaintainer::new(100 * MB, 0.2).free_target(), 20 * MB);
        assert_eq!(EvictionMaintainer::new(100, 0.2).free_target(), 20);
        assert_eq!(EvictionMaintainer::default().max_cache_size(), 100 * MB);
    }

    #[tokio::test]
    async fn test_under_budget_is_untouched() {
        let store = open_store().await;
        let maintainer = EvictionMaintainer::new(100, 0.2);
        let now = Utc::now();

        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            let e = entry_at(name, 25, now + Duration::seconds(i as i64));
            maintainer.put_and_maintain(&store, e).await.unwrap();
        }

        // Exactly at the budget is not over it
        assert_eq!(store.total_size().await.unwrap(), 100);
        assert_eq!(store.len().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_fifth_insert_evicts_only_the_oldest() {
        let store = open_store().await;
        let maintainer = EvictionMaintainer::new(100, 0.2);
        let now = Utc::now();

        let names = ["a", "b", "c", "d", "e"];
        let entries: Vec<CacheEntry> = names
            .iter()
            .enumerate()
            .map(|(i, name)| entry_at(name, 25, now + Duration::seconds(i as i64)))
            .collect();

        let mut last = EvictionReport::default();
        for e in entries.iter().cloned() {
            last = maintainer.put_and_maintain(&store, e).await.unwrap();
        }

        assert_eq!(last.total_before, 125);
        assert_eq!(last.size_removed, 1);
        assert_eq!(last.bytes_freed, 25);
        assert_eq!(last.total_after, 100);
        let expected: Vec<String> = entries[1..].iter().map(|e| e.meta.id.clone()).collect();
        assert_eq!(ids(&store).await, expected);
    }

    #[tokio::test]
    async fn test_size_purge_frees_share_of_capacity() {
        let store = open_store().await;
        let maintainer = EvictionMaintainer::new(100, 0.2);
        let now = Utc::now();

        // Ten 10-byte entries, then one more pushes usage to 110
        for i in 0..11 {
            let e = entry_at(&format!("img{}", i), 10, now + Duration::seconds(i));
            maintainer.put_and_maintain(&store, e).await.unwrap();
        }

        // 20 bytes of capacity freed: the two oldest go
        assert_eq!(store.total_size().await.unwrap(), 90);
        let remaining = ids(&store).await;
        assert_eq!(remaining.len(), 9);
        assert_eq!(remaining[0], entry_at("img2", 10, now).meta.id);
    }

    #[tokio::test]
    async fn test_newest_entry_evicted_only_when_alone_over_budget() {
        let store = open_store().await;
        let maintainer = EvictionMaintainer::new(100, 0.2);
        let now = Utc::now();

        let giant = entry_at("giant", 150, now);
        maintainer.put_and_maintain(&store, giant).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 0);
        assert_eq!(store.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_entries_purged_first() {
        let store = open_store().await;
        let maintainer = EvictionMaintainer::new(100, 0.2);
        let now = Utc::now();

        let stale = entry_at("stale", 10, now - Duration::days(8));
        let fresh = entry_at("fresh", 10, now);
        store.put(stale.clone()).await.unwrap();

        let report = maintainer.put_and_maintain(&store, fresh.clone()).await.unwrap();

        assert_eq!(report.expired_removed, 1);
        assert_eq!(report.size_removed, 0);
        assert!(store.get(stale.id()).await.unwrap().is_none());
        assert!(store.get(fresh.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_on_closed_store_is_swallowed() {
        let store = CacheStore::in_memory();
        let report = EvictionMaintainer::default().run(&store).await;
        assert_eq!(report, EvictionReport::default());
    }

    /// Engine whose deletes always fail
    struct StickyEngine(MemoryEngine);

    #[async_trait]
    impl StorageEngine for StickyEngine {
        async fn open(&self) -> Result<()> {
            self.0.open().await
        }
        async fn read(&self, id: &str) -> Result<Option<CacheEntry>> {
            self.0.read(id).await
        }
        async fn write(&self, entry: &CacheEntry) -> Result<()> {
            self.0.write(entry).await
        }
        async fn remove(&self, _id: &str) -> Result<()> {
            Err(CacheError::Storage("disk is read-only".to_string()))
        }
        async fn index(&self) -> Result<Vec<EntryMeta>> {
            self.0.index().await
        }
        async fn clear(&self) -> Result<()> {
            self.0.clear().await
        }
    }

    #[tokio::test]
    async fn test_delete_failures_never_fail_the_write() {
        let store = CacheStore::new(Arc::new(StickyEngine(MemoryEngine::new())));
        store.init().await.unwrap();
        let maintainer = EvictionMaintainer::new(10, 0.2);

        let report = maintainer
            .put_and_maintain(&store, entry_at("big", 50, Utc::now()))
            .await
            .unwrap();

        assert_eq!(report.size_removed, 0);
        assert_eq!(store.len().await.unwrap(), 1);
    }
}
