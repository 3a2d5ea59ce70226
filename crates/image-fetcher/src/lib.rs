//! Image Fetcher
//!
//! Downloads images over HTTP behind a narrow [`HttpClient`] boundary and
//! validates that what came back is a successful `image/*` response.

pub mod client;
pub mod error;
pub mod types;
pub mod validate;

pub use client::{HttpClient, ImageFetcher, ReqwestHttpClient};
pub use error::{FetchError, Result};
pub use types::{FetchedImage, HttpResponse};
pub use validate::{is_image_content_type, normalize_content_type, validate_response};
