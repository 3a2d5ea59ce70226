//! HTTP response and validated image types

use bytes::Bytes;

/// Raw response as seen at the network boundary
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub data: Bytes,
    /// Media type without parameters, lowercased
    pub content_type: String,
}
