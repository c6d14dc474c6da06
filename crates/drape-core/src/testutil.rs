//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{BackoffConfig, PipelineConfig};
use crate::error::AppError;
use crate::models::{GenerationOutput, GenerationRequest};
use crate::relay::{RelayConfig, RelayEndpoint};
use crate::traits::{Clock, HttpTransport, ImageGenerator, TransportRequest, TransportResponse};

/// Smallest JFIF-looking payload.
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0xFF, 0xD9,
];

/// PNG signature followed by the start of an IHDR chunk.
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
    b'R',
];

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// One scripted transport outcome.
pub enum MockReply {
    Respond(TransportResponse),
    Fail(AppError),
    /// Sleep, then fail; long enough stalls trip the pipeline deadline.
    Stall(Duration),
}

pub fn ok(response: TransportResponse) -> MockReply {
    MockReply::Respond(response)
}

pub fn err(error: AppError) -> MockReply {
    MockReply::Fail(error)
}

pub fn stall(duration: Duration) -> MockReply {
    MockReply::Stall(duration)
}

/// Mock transport that replays scripted replies in call order.
#[derive(Clone)]
pub struct MockTransport {
    /// Queue of replies. Each call pops the first element.
    replies: Arc<Mutex<Vec<MockReply>>>,
    /// Served once the queue is empty; `None` means a network error.
    fallback: Option<TransportResponse>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MockTransport {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            fallback: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request gets the same response.
    pub fn always(response: TransportResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Self::new(vec![])
        }
    }

    /// Every request fails with a network error.
    pub fn failing() -> Self {
        Self::new(vec![])
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpTransport for MockTransport {
    async fn get(&self, request: &TransportRequest) -> Result<TransportResponse, AppError> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                None
            } else {
                Some(replies.remove(0))
            }
        };

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(error)) => Err(error),
            Some(MockReply::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Err(AppError::Timeout(duration.as_millis() as u64))
            }
            None => match &self.fallback {
                Some(response) => Ok(response.clone()),
                None => Err(AppError::NetworkError("no scripted response".into())),
            },
        }
    }
}

pub fn image_response(bytes: &[u8], mime_type: &str) -> TransportResponse {
    TransportResponse {
        status: 200,
        content_type: Some(mime_type.to_string()),
        body: bytes.to_vec(),
    }
}

pub fn status_response(status: u16) -> TransportResponse {
    TransportResponse {
        status,
        content_type: None,
        body: Vec::new(),
    }
}

pub fn html_response(html: &str) -> TransportResponse {
    TransportResponse {
        status: 200,
        content_type: Some("text/html".to_string()),
        body: html.as_bytes().to_vec(),
    }
}

pub fn json_response(value: &serde_json::Value) -> TransportResponse {
    TransportResponse {
        status: 200,
        content_type: Some("application/json".to_string()),
        body: value.to_string().into_bytes(),
    }
}

/// Two reliable relays (encoded, verbatim) and one of each other family.
pub fn test_relays() -> RelayConfig {
    RelayConfig {
        reliable: vec![
            RelayEndpoint::encoded("relay-a", "https://relay-a.test/raw?url={url}"),
            RelayEndpoint::verbatim("relay-b", "https://relay-b.test/fetch/{url}"),
        ],
        image: vec![RelayEndpoint::encoded(
            "relay-img",
            "https://relay-img.test/?url={url}",
        )],
        cors_bypass: vec![RelayEndpoint::encoded(
            "relay-env",
            "https://relay-env.test/get?url={url}",
        )],
    }
}

/// Default config without backoff sleeps and with test relays.
pub fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_backoff(BackoffConfig::none())
        .with_timeout(Duration::from_secs(2))
        .with_relays(test_relays())
}

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

fn parse_instant(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn at(rfc3339: &str) -> Self {
        Self {
            now: Arc::new(Mutex::new(parse_instant(rfc3339))),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Clock that moves forward one second every time it is read.
#[derive(Clone)]
pub struct StepClock {
    next: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for StepClock {
    fn default() -> Self {
        Self {
            next: Arc::new(Mutex::new(parse_instant("2026-01-01T00:00:00Z"))),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock().unwrap();
        let current = *next;
        *next += chrono::Duration::seconds(1);
        current
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Mock generator that returns configurable output.
#[derive(Clone)]
pub struct MockGenerator {
    responses: Arc<Mutex<Vec<Result<GenerationOutput, AppError>>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockGenerator {
    pub fn new(output: GenerationOutput) -> Self {
        Self::with_responses(vec![Ok(output)])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<GenerationOutput, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ImageGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(GenerationOutput::Text {
                text: "default".into(),
            })
        } else {
            responses.remove(0)
        }
    }
}
