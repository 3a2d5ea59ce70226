//! Error types for the image blob cache

use std::fmt;

/// Errors raised by the cache store, the fetch pipeline and the client adapter.
///
/// Payloads are plain strings so the error can be cloned into reactive state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No durable storage on this platform, or the store is not open.
    StorageUnavailable(String),
    /// A storage transaction failed after the store was opened.
    Storage(String),
    /// Transport failure or non-2xx response.
    NetworkFailure(String),
    /// The response was not an image.
    InvalidContent(String),
    /// A stored entry could not be decoded.
    CorruptEntry(String),
    /// The resolution was superseded. Never shown to consumers.
    Cancelled,
}

impl CacheError {
    /// Only network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::NetworkFailure(_))
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            CacheError::Storage(msg) => write!(f, "Storage error: {}", msg),
            CacheError::NetworkFailure(msg) => write!(f, "Network failure: {}", msg),
            CacheError::InvalidContent(msg) => write!(f, "Invalid content: {}", msg),
            CacheError::CorruptEntry(id) => write!(f, "Corrupt cache entry: {}", id),
            CacheError::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
