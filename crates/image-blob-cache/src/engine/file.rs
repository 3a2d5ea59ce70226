//! File-based durable storage engine
//!
//! Each entry is two files in the cache directory: `<id>.bin` holds the image
//! bytes and `<id>.json` holds the [`EntryMeta`] header plus a SHA-256 of the
//! bytes. Both are written to a temporary file and renamed into place, blob
//! first. A blob paired with a header from another write fails the digest
//! check, and a blob whose header never landed is swept by `index`.

use super::StorageEngine;
use crate::error::{CacheError, Result};
use crate::types::{CacheEntry, EntryMeta};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const HEADER_EXT: &str = "json";
const BLOB_EXT: &str = "bin";
const TMP_EXT: &str = "tmp";

/// On-disk header
#[derive(Debug, Serialize, Deserialize)]
struct StoredHeader {
    meta: EntryMeta,
    sha256: String,
}

fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Durable engine backed by a directory
#[derive(Debug, Clone)]
pub struct FileEngine {
    dir: PathBuf,
}

impl FileEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn header_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, HEADER_EXT))
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, BLOB_EXT))
    }

    /// Load and check a header. `Ok(None)` when no header exists.
    async fn load_header(&self, id: &str) -> Result<Option<StoredHeader>> {
        let raw = match fs::read(self.header_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let header: StoredHeader = serde_json::from_slice(&raw).map_err(|e| {
            debug!(key = %id, error = %e, "Failed to decode cache header");
            CacheError::CorruptEntry(id.to_string())
        })?;

        if header.meta.id != id {
            return Err(CacheError::CorruptEntry(id.to_string()));
        }

        Ok(Some(header))
    }

    async fn drop_files(&self, id: &str) -> Result<()> {
        remove_if_exists(&self.blob_path(id)).await?;
        remove_if_exists(&self.header_path(id)).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for FileEngine {
    async fn open(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            CacheError::StorageUnavailable(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        // A directory we cannot write to is as good as none
        let probe = self.dir.join(".probe");
        fs::write(&probe, b"").await.map_err(|e| {
            CacheError::StorageUnavailable(format!("{} is not writable: {}", self.dir.display(), e))
        })?;
        let _ = fs::remove_file(&probe).await;

        info!(cache_dir = ?self.dir, "File engine opened");
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Option<CacheEntry>> {
        let Some(StoredHeader { meta, sha256 }) = self.load_header(id).await? else {
            return Ok(None);
        };

        let data = match fs::read(self.blob_path(id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CacheError::CorruptEntry(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if data.len() as u64 != meta.size_bytes {
            debug!(
                key = %id,
                expected = meta.size_bytes,
                actual = data.len(),
                "Cached blob size does not match header"
            );
            return Err(CacheError::CorruptEntry(id.to_string()));
        }

        if digest(&data) != sha256 {
            debug!(key = %id, "Cached blob does not match header digest");
            return Err(CacheError::CorruptEntry(id.to_string()));
        }

        Ok(Some(CacheEntry {
            meta,
            data: Bytes::from(data),
        }))
    }

    async fn write(&self, entry: &CacheEntry) -> Result<()> {
        let header = StoredHeader {
            meta: entry.meta.clone(),
            sha256: digest(&entry.data),
        };
        let header = serde_json::to_vec(&header).map_err(|e| CacheError::Storage(e.to_string()))?;

        write_atomic(&self.blob_path(&entry.meta.id), &entry.data).await?;
        write_atomic(&self.header_path(&entry.meta.id), &header).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.drop_files(id).await
    }

    async fn index(&self) -> Result<Vec<EntryMeta>> {
        let mut dir = fs::read_dir(&self.dir).await?;
        let mut metas = Vec::new();
        let mut blobs = Vec::new();

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let ext = path.extension().and_then(|e| e.to_str());

            if ext == Some(TMP_EXT) {
                // Leftover from an interrupted write
                let _ = fs::remove_file(&path).await;
                continue;
            }
            if ext == Some(BLOB_EXT) {
                blobs.push(path);
                continue;
            }
            if ext != Some(HEADER_EXT) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let checked = match self.load_header(id).await {
                Ok(Some(StoredHeader { meta, .. })) => match fs::metadata(self.blob_path(id)).await {
                    Ok(m) if m.len() == meta.size_bytes => Ok(meta),
                    _ => Err(CacheError::CorruptEntry(id.to_string())),
                },
                Ok(None) => continue,
                Err(e) => Err(e),
            };

            match checked {
                Ok(meta) => metas.push(meta),
                Err(e) => {
                    warn!(key = %id, error = %e, "Dropping unreadable cache entry");
                    if let Err(e) = self.drop_files(id).await {
                        warn!(key = %id, error = %e, "Failed to remove unreadable cache entry");
                    }
                }
            }
        }

        // Blobs whose header never landed
        let live: HashSet<&str> = metas.iter().map(|m| m.id.as_str()).collect();
        for path in blobs {
            let orphan = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|id| !live.contains(id));
            if orphan {
                debug!(path = ?path, "Removing blob without header");
                remove_if_exists(&path).await?;
            }
        }

        Ok(metas)
    }

    async fn clear(&self) -> Result<()> {
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let ours = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some(HEADER_EXT) | Some(BLOB_EXT) | Some(TMP_EXT)
            );
            if ours {
                remove_if_exists(&path).await?;
            }
        }
        Ok(())
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".");
    tmp.push(TMP_EXT);
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageBlob, ImageCategory, DEFAULT_TTL};
    use chrono::Utc;
    use tempfile::tempdir;

    fn entry(url: &str, data: &[u8]) -> CacheEntry {
        CacheEntry::new(
            url,
            ImageCategory::Playlist,
            ImageBlob::new(data.to_vec(), "image/webp"),
            Utc::now(),
            DEFAULT_TTL,
        )
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path().join("images"));
        engine.open().await.unwrap();
        engine.open().await.unwrap();
        assert!(dir.path().join("images").is_dir());
    }

    #[tokio::test]
    async fn test_open_fails_when_path_is_a_file() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let engine = FileEngine::new(blocker.join("images"));
        let err = engine.open().await.unwrap_err();
        assert!(matches!(err, CacheError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let e = entry("https://example.com/cover.webp", b"webp bytes");

        {
            let engine = FileEngine::new(dir.path());
            engine.open().await.unwrap();
            engine.write(&e).await.unwrap();
        }

        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();
        let read = engine.read(e.id()).await.unwrap().unwrap();
        assert_eq!(read, e);

        let index = engine.index().await.unwrap();
        assert_eq!(index, vec![e.meta.clone()]);
    }

    #[tokio::test]
    async fn test_write_replaces_existing() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();

        let url = "https://example.com/cover.webp";
        engine.write(&entry(url, b"first")).await.unwrap();
        let second = entry(url, b"second version");
        engine.write(&second).await.unwrap();

        let read = engine.read(second.id()).await.unwrap().unwrap();
        assert_eq!(read.data.as_ref(), b"second version");
        assert_eq!(engine.index().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_header_is_reported() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();

        let e = entry("https://example.com/a.webp", b"abc");
        engine.write(&e).await.unwrap();
        std::fs::write(engine.header_path(e.id()), b"{not json").unwrap();

        let err = engine.read(e.id()).await.unwrap_err();
        assert_eq!(err, CacheError::CorruptEntry(e.id().to_string()));
    }

    #[tokio::test]
    async fn test_truncated_blob_is_corrupt() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();

        let e = entry("https://example.com/a.webp", b"abcdef");
        engine.write(&e).await.unwrap();
        std::fs::write(engine.blob_path(e.id()), b"abc").unwrap();

        assert!(matches!(
            engine.read(e.id()).await,
            Err(CacheError::CorruptEntry(_))
        ));
    }

    #[tokio::test]
    async fn test_index_drops_corrupt_entries() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();

        let good = entry("https://example.com/good.webp", b"good");
        let bad = entry("https://example.com/bad.webp", b"bad");
        engine.write(&good).await.unwrap();
        engine.write(&bad).await.unwrap();
        std::fs::remove_file(engine.blob_path(bad.id())).unwrap();
        std::fs::write(dir.path().join("stale.json.tmp"), b"partial").unwrap();

        let index = engine.index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].id, good.id());
        assert!(!engine.header_path(bad.id()).exists());
        assert!(!dir.path().join("stale.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_same_size_blob_from_another_write_is_corrupt() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();

        let e = entry("https://example.com/a.webp", b"first");
        engine.write(&e).await.unwrap();
        // A newer blob landed but its header did not
        std::fs::write(engine.blob_path(e.id()), b"other").unwrap();

        assert_eq!(
            engine.read(e.id()).await.unwrap_err(),
            CacheError::CorruptEntry(e.id().to_string())
        );
    }

    #[tokio::test]
    async fn test_index_sweeps_blobs_without_header() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();

        let good = entry("https://example.com/good.webp", b"good");
        engine.write(&good).await.unwrap();
        let orphan = dir.path().join("playlist-deadbeef.bin");
        std::fs::write(&orphan, b"no header").unwrap();

        let index = engine.index().await.unwrap();
        assert_eq!(index, vec![good.meta.clone()]);
        assert!(!orphan.exists());
        assert!(engine.blob_path(good.id()).exists());
    }

    #[tokio::test]
    async fn test_clear_removes_entries() {
        let dir = tempdir().unwrap();
        let engine = FileEngine::new(dir.path());
        engine.open().await.unwrap();

        engine.write(&entry("https://example.com/1.webp", b"1")).await.unwrap();
        engine.write(&entry("https://example.com/2.webp", b"2")).await.unwrap();
        engine.clear().await.unwrap();

        assert!(engine.index().await.unwrap().is_empty());
    }
}
