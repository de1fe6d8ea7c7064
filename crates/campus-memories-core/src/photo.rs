//! Conversion of selected image files into inline `data:` payloads.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::model::PhotoPayload;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PhotoError {
    #[error("{name}: unsupported image type")]
    UnsupportedType { name: String },
    #[error("{name}: file is empty")]
    Empty { name: String },
    #[error("{name}: {message}")]
    Read { name: String, message: String },
}

impl PhotoError {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::UnsupportedType { name } | Self::Empty { name } | Self::Read { name, .. } => {
                name
            }
        }
    }
}

/// MIME type for an image file, chosen by extension.
#[must_use]
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Encode raw file bytes as a `data:<mime>;base64,...` payload.
///
/// # Errors
/// Returns [`PhotoError::UnsupportedType`] for non-image extensions and
/// [`PhotoError::Empty`] for zero-length files.
pub fn encode_photo(path: &Path, bytes: &[u8]) -> Result<PhotoPayload, PhotoError> {
    let name = path.display().to_string();
    let Some(mime) = image_mime_type(path) else {
        return Err(PhotoError::UnsupportedType { name });
    };
    if bytes.is_empty() {
        return Err(PhotoError::Empty { name });
    }
    Ok(PhotoPayload(format!("data:{mime};base64,{}", STANDARD.encode(bytes))))
}
