//! Error types for the image cache warmer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarmerError {
    #[error("Cache error: {0}")]
    Cache(#[from] image_blob_cache::CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<tracing_subscriber::filter::ParseError> for WarmerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        WarmerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WarmerError>;
