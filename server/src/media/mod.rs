//! Object store for uploaded images.
//!
//! Clients send images inline as `data:<mime>;base64,<payload>` strings.
//! The payload is decoded, validated, and handed to an [`ObjectStore`],
//! which returns a stable URL that is persisted in place of the bytes.

pub mod local;
pub mod routes;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

use crate::error::AppError;

pub use local::LocalObjectStore;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid object key: {0}")]
    InvalidKey(String),
}

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub image_type: ImageType,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` and return the URL they can be fetched from.
    async fn put(&self, bytes: Vec<u8>, image_type: ImageType) -> Result<String, ObjectStoreError>;

    /// Fetch a previously stored object by key. `Ok(None)` if absent.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, ObjectStoreError>;
}

#[derive(Debug)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub image_type: ImageType,
}

/// Parse a base64 data URL, rejecting anything that is not a supported
/// image within `max_bytes`.
pub fn decode_data_url(data_url: &str, max_bytes: usize) -> Result<InlineImage, AppError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| AppError::validation("Image must be a data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AppError::validation("Malformed image data"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| AppError::validation("Image data must be base64 encoded"))?;
    let image_type = ImageType::from_mime(mime)
        .ok_or_else(|| AppError::validation(format!("Unsupported image type: {}", mime)))?;

    // Reject before decoding when the encoded form is already too large.
    if payload.len() / 4 * 3 > max_bytes + 3 {
        return Err(too_large(max_bytes));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| AppError::validation("Malformed image data"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("Image is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(too_large(max_bytes));
    }

    Ok(InlineImage { bytes, image_type })
}

fn too_large(max_bytes: usize) -> AppError {
    AppError::validation(format!(
        "Image exceeds maximum size of {} MB",
        max_bytes / (1024 * 1024)
    ))
}

/// Decode an inline image and upload it. Returns the stored URL.
pub async fn upload_inline(
    store: &dyn ObjectStore,
    data_url: &str,
    max_bytes: usize,
) -> Result<String, AppError> {
    let image = decode_data_url(data_url, max_bytes)?;
    let size = image.bytes.len();
    let url = store.put(image.bytes, image.image_type).await?;
    tracing::debug!(url = %url, size, "Stored inline image");
    Ok(url)
}
