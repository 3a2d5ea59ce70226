//! Response validation

use crate::error::{FetchError, Result};
use crate::types::{FetchedImage, HttpResponse};

/// Strip parameters and lowercase: `Image/PNG; q=1` becomes `image/png`.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}

pub fn is_image_content_type(content_type: &str) -> bool {
    normalize_content_type(content_type)
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.is_empty())
}

/// Accept a 2xx response whose content type is `image/*`.
pub fn validate_response(response: HttpResponse) -> Result<FetchedImage> {
    if !response.is_success() {
        return Err(FetchError::Status(response.status));
    }

    let content_type = match response.content_type.as_deref() {
        Some(ct) if is_image_content_type(ct) => normalize_content_type(ct),
        Some(ct) => return Err(FetchError::InvalidContent(ct.to_string())),
        None => return Err(FetchError::InvalidContent("no content type".to_string())),
    };

    Ok(FetchedImage {
        data: response.body,
        content_type,
    })
}
