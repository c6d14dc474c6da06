//! Image payload validation.
//!
//! Checks run in a fixed order and the first failure is returned:
//! emptiness, the size ceiling, the declared MIME type, and finally the
//! magic-byte signature. The signature decides the format; a declared type
//! that disagrees with it is ignored as long as it is on the allow-list.

use serde::Serialize;
use thiserror::Error;

/// Largest payload the pipeline will hand downstream.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// Body limit for responses that should be an image: one byte past the
/// ceiling, so oversize payloads are still detected.
pub const IMAGE_BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1;

/// Body limit for relay responses, which may carry the image base64-encoded
/// inside a JSON envelope or alongside page markup.
pub const RELAY_BODY_LIMIT: usize = MAX_IMAGE_BYTES / 3 * 4 + 4 + 1024 * 1024;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// Image formats accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    const ALL: [ImageFormat; 4] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Webp,
    ];

    #[must_use]
    pub const fn signature(self) -> &'static [u8] {
        match self {
            Self::Jpeg => &[0xFF, 0xD8, 0xFF],
            Self::Png => &[0x89, 0x50, 0x4E, 0x47],
            Self::Gif => &[0x47, 0x49, 0x46],
            // RIFF container
            Self::Webp => &[0x52, 0x49, 0x46, 0x46],
        }
    }

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    /// Identify a format from the leading bytes of a payload.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| bytes.starts_with(format.signature()))
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Why a payload was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("payload is empty")]
    Empty,

    /// `size` counts the bytes read, which stops at the transport's body limit.
    #[error("payload exceeds the {limit}-byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("MIME type '{0}' is not a supported image type")]
    UnsupportedMimeType(String),

    #[error("leading bytes do not match any supported image signature")]
    UnrecognizedSignature,
}

/// Validate an image payload and return the format its signature identifies.
pub fn validate_content(bytes: &[u8], declared_mime: Option<&str>) -> Result<ImageFormat, ContentError> {
    if bytes.is_empty() {
        return Err(ContentError::Empty);
    }

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ContentError::TooLarge {
            size: bytes.len(),
            limit: MAX_IMAGE_BYTES,
        });
    }

    if let Some(mime) = declared_mime.and_then(essence) {
        if mime.starts_with("image/") && !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(ContentError::UnsupportedMimeType(mime));
        }
    }

    ImageFormat::sniff(bytes).ok_or(ContentError::UnrecognizedSignature)
}

/// Lowercased MIME type without parameters, or `None` if blank.
pub fn essence(content_type: &str) -> Option<String> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    (!essence.is_empty()).then_some(essence)
}
