//! Local references: short-lived, renderable handles to cached bytes
//!
//! A [`LocalReference`] is what a consumer renders instead of a remote URL.
//! The registry is the process-side table behind those handles; whoever
//! creates a reference must revoke it once it is superseded.

use image_blob_cache::ImageBlob;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

const HANDLE_PREFIX: &str = "blob:image-cache/";

/// Handle plus the bytes it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReference {
    handle: String,
    blob: ImageBlob,
}

impl LocalReference {
    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn blob(&self) -> &ImageBlob {
        &self.blob
    }
}

/// What a consumer renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Cached or freshly downloaded bytes
    Local(LocalReference),
    /// A URL to load directly, uncached (fallback or the original source)
    Remote(String),
}

impl ImageSource {
    pub fn url(&self) -> &str {
        match self {
            ImageSource::Local(reference) => reference.handle(),
            ImageSource::Remote(url) => url,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ImageSource::Local(_))
    }
}

/// Table of live handles
#[derive(Debug, Default)]
pub struct LocalRefRegistry {
    live: Mutex<HashMap<String, ImageBlob>>,
    next_id: AtomicU64,
}

impl LocalRefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, blob: ImageBlob) -> LocalReference {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = format!("{}{}", HANDLE_PREFIX, id);
        self.live.lock().insert(handle.clone(), blob.clone());
        LocalReference { handle, blob }
    }

    /// Bytes behind a live handle
    pub fn resolve(&self, handle: &str) -> Option<ImageBlob> {
        self.live.lock().get(handle).cloned()
    }

    /// Release a handle. Returns false if it was already revoked.
    pub fn revoke(&self, reference: &LocalReference) -> bool {
        self.live.lock().remove(reference.handle()).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
