//! Image encoding: image file → base64 wrapped in `ImageData`.
//!
//! Page renders are PNG; uploaded receipts may be PNG or JPEG. The MIME type
//! is sniffed from the magic bytes rather than trusted from a file extension.
//! `detail: "high"` asks GPT-4-class models for the full tile budget, which
//! fine-print receipts need.

use crate::error::ExpenseError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// MIME type of a supported image (PNG or JPEG), sniffed from its bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        _ => None,
    }
}

/// Base64-encode raw image bytes for the VLM API.
///
/// Returns `None` when the bytes are neither PNG nor JPEG.
pub fn encode_image(bytes: &[u8]) -> Option<ImageData> {
    let mime = sniff_mime(bytes)?;
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} image → {} bytes base64", mime, b64.len());
    Some(ImageData::new(b64, mime).with_detail("high"))
}

/// Read and encode an image file.
pub async fn load_image(path: &Path) -> Result<ImageData, ExpenseError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExpenseError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ExpenseError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExpenseError::Internal(format!("Failed to read {}: {}", path.display(), e)),
    })?;

    encode_image(&bytes).ok_or_else(|| ExpenseError::UnsupportedImage {
        path: path.to_path_buf(),
    })
}
