//! Cache key derivation

use crate::types::ImageCategory;
use sha2::{Digest, Sha256};

/// Derive the cache key for an image URL within a category.
///
/// The key is `<category>-<sha256 hex>`, so it is safe to use as a file name
/// and any input (even a malformed URL) maps to a stable key.
pub fn derive_key(source_url: &str, category: ImageCategory) -> String {
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(source_url.as_bytes());
    format!("{}-{}", category.as_str(), hex::encode(hasher.finalize()))
}
