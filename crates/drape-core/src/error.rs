use serde::Serialize;
use thiserror::Error;

use crate::content::ContentError;
use crate::models::ExtractionFailure;

/// Stable classification of an [`AppError`], recorded in attempt logs and
/// surfaced to callers without exposing the full error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    MalformedUrl,
    BlockedHost,
    Timeout,
    NetworkError,
    HttpStatusError,
    EmptyResponse,
    ValidationFailed,
    AllStrategiesExhausted,
    Config,
    Generation,
    Serialization,
}

impl ErrorKind {
    /// Kinds raised while validating the input URL, before any network call.
    pub fn is_input_rejection(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput | ErrorKind::MalformedUrl | ErrorKind::BlockedHost
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::MalformedUrl => "malformed_url",
            ErrorKind::BlockedHost => "blocked_host",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::HttpStatusError => "http_status_error",
            ErrorKind::EmptyResponse => "empty_response",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::AllStrategiesExhausted => "all_strategies_exhausted",
            ErrorKind::Config => "config",
            ErrorKind::Generation => "generation",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-wide error types for Drape.
#[derive(Error, Debug)]
pub enum AppError {
    /// Input was empty or not usable as a URL at all.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Input could not be parsed as an http(s) URL.
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// Host is loopback, unspecified, or otherwise private.
    #[error("Blocked host: {0}")]
    BlockedHost(String),

    /// Request timed out.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Remote answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Remote answered, but with nothing usable.
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// Bytes were fetched but are not an acceptable image.
    #[error("Content validation failed: {0}")]
    ValidationFailed(#[from] ContentError),

    /// Every configured strategy failed.
    #[error("{}", .0.aggregate_message)]
    AllStrategiesExhausted(Box<ExtractionFailure>),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Image generation API call failed.
    #[error("Generation error (HTTP {status_code}): {message}")]
    GenerationError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Rate limit exceeded by the generation API.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::MalformedUrl(_) => ErrorKind::MalformedUrl,
            AppError::BlockedHost(_) => ErrorKind::BlockedHost,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::NetworkError(_) => ErrorKind::NetworkError,
            AppError::HttpStatus { .. } => ErrorKind::HttpStatusError,
            AppError::EmptyResponse(_) => ErrorKind::EmptyResponse,
            AppError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            AppError::AllStrategiesExhausted(_) => ErrorKind::AllStrategiesExhausted,
            AppError::ConfigError(_) => ErrorKind::Config,
            AppError::GenerationError { .. } | AppError::RateLimitExceeded => {
                ErrorKind::Generation
            }
            AppError::SerializationError(_) => ErrorKind::Serialization,
        }
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AppError::GenerationError { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// The aggregated failure, when every strategy was exhausted.
    pub fn as_failure(&self) -> Option<&ExtractionFailure> {
        match self {
            AppError::AllStrategiesExhausted(failure) => Some(failure),
            _ => None,
        }
    }
}
