use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{GenerationOutput, GenerationRequest};

/// A single outbound GET issued by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub accept: String,
    pub user_agent: String,
    pub timeout: Duration,
    /// Stop reading the body after this many bytes.
    pub max_body_bytes: usize,
}

/// Whatever came back, regardless of status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs raw HTTP GETs on behalf of the acquisition strategies.
///
/// Implementations return `Ok` for any HTTP status and reserve `Err` for
/// transport-level failures (`Timeout`, `NetworkError`). Interpreting the
/// status is the strategy's job.
pub trait HttpTransport: Send + Sync + Clone {
    fn get(
        &self,
        request: &TransportRequest,
    ) -> impl Future<Output = Result<TransportResponse, AppError>> + Send;
}

/// Sends an image plus a text prompt to a generative model.
pub trait ImageGenerator: Send + Sync + Clone {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationOutput, AppError>> + Send;
}

/// Source of wall-clock time, injectable for tests.
pub trait Clock: Send + Sync + Clone {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
