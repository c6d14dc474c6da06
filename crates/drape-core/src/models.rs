use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::content::ImageFormat;
use crate::error::ErrorKind;
use crate::normalize::UrlHint;
use crate::strategy::Strategy;

/// Raw bytes produced by a single strategy, before content validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// Content type as declared by whoever served the bytes.
    pub mime_type: Option<String>,
}

impl FetchedImage {
    pub fn new(bytes: Vec<u8>, mime_type: Option<String>) -> Self {
        Self { bytes, mime_type }
    }

    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }
}

/// One strategy's turn in an extraction. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionAttempt {
    pub strategy: Strategy,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Number of times the strategy ran (more than one only with per-strategy retry).
    pub tries: u32,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Validated image handed to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    /// Set whenever content validation ran.
    pub detected_format: Option<ImageFormat>,
    pub source_url: String,
    pub strategy_used: Strategy,
    pub byte_length: usize,
    /// SHA-256 of the image bytes
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
    pub attempts: Vec<ExtractionAttempt>,
}

/// Aggregated outcome when every strategy failed.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionFailure {
    pub source_url: String,
    pub hint: UrlHint,
    pub attempts: Vec<ExtractionAttempt>,
    pub aggregate_message: String,
    pub suggestions: Vec<String>,
}

/// Input to the downstream image generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub prompt: String,
}

/// What the generation service sent back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationOutput {
    Text {
        text: String,
    },
    Image {
        #[serde(skip)]
        bytes: Vec<u8>,
        mime_type: String,
    },
}

impl GenerationOutput {
    pub fn byte_length(&self) -> usize {
        match self {
            GenerationOutput::Text { text } => text.len(),
            GenerationOutput::Image { bytes, .. } => bytes.len(),
        }
    }
}

/// Compute a SHA-256 hash of arbitrary bytes, returned as 64-char hex.
pub fn compute_hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    format!("{:x}", hasher.finalize())
}
