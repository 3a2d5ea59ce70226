//! Network boundary and image fetching

use crate::error::Result;
use crate::types::{FetchedImage, HttpResponse};
use crate::validate::validate_response;
use async_trait::async_trait;
use reqwest::header;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = "image-fetcher-rs/0.1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal HTTP GET boundary, so fetch logic can run against fakes
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by reqwest
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client with default settings (30 second timeout)
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        // Let intermediate HTTP caches answer with whatever they hold
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "image/*")
            .header(header::CACHE_CONTROL, "max-stale")
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Downloads images and rejects anything that is not one
#[derive(Clone)]
pub struct ImageFetcher {
    http: Arc<dyn HttpClient>,
}

impl ImageFetcher {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Fetcher using reqwest with the given timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Arc::new(ReqwestHttpClient::with_timeout(timeout)))
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        debug!(url = %url, "Fetching image");

        let response = self.http.get(url).await.map_err(|e| {
            warn!(url = %url, error = %e, "Image request failed");
            e
        })?;

        let image = validate_response(response).map_err(|e| {
            warn!(url = %url, error = %e, "Rejected image response");
            e
        })?;

        debug!(
            url = %url,
            size = image.data.len(),
            content_type = %image.content_type,
            "Fetched image"
        );
        Ok(image)
    }
}
