//! Error types for the image fetcher

use std::fmt;

#[derive(Debug)]
pub enum FetchError {
    /// Transport failure: DNS, connect, TLS, timeout, cross-origin rejection
    Http(Box<reqwest::Error>),
    /// The server answered with a non-2xx status
    Status(u16),
    /// The response body is not an image
    InvalidContent(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(err) => write!(f, "HTTP error: {}", err),
            FetchError::Status(status) => write!(f, "Server returned status {}", status),
            FetchError::InvalidContent(content_type) => {
                write!(f, "Expected an image, got {}", content_type)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
