//! Image attachments: loading from disk and decoding queued payloads

use crate::error::{ClientError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hearth_protocol::ImageData;
use std::path::Path;

/// Maximum image size: 10 MB
const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Allowed image extensions and their mime types
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
];

/// Mime type for a file name, if it is an accepted image
pub fn mime_for(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Build an attachment from raw bytes
pub fn encode(file_name: &str, bytes: &[u8]) -> Result<ImageData> {
    if bytes.is_empty() {
        return Err(ClientError::InvalidImage("Image is empty".to_string()));
    }

    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ClientError::InvalidImage(format!(
            "Image too large. Maximum size is {} MB",
            MAX_IMAGE_SIZE / 1024 / 1024
        )));
    }

    let mime_type = mime_for(file_name)
        .ok_or_else(|| ClientError::InvalidImage(format!("'{}' is not a supported image type", file_name)))?;

    Ok(ImageData {
        base64: STANDARD.encode(bytes),
        mime_type: mime_type.to_string(),
        file_name: file_name.to_string(),
    })
}

/// Read an image file into an attachment
pub async fn load(path: &Path) -> Result<ImageData> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::InvalidImage(format!("Invalid file name: {:?}", path)))?;

    let bytes = tokio::fs::read(path).await?;
    encode(file_name, &bytes)
}

/// Raw bytes of a queued attachment
pub fn decode(image: &ImageData) -> Result<Vec<u8>> {
    STANDARD
        .decode(image.base64.as_bytes())
        .map_err(|e| ClientError::InvalidImage(format!("Corrupt image payload: {}", e)))
}
