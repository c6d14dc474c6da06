use std::time::Duration;

use drape_core::error::AppError;
use drape_core::normalize;
use drape_core::traits::{HttpTransport, TransportRequest, TransportResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, redirect};

const MAX_REDIRECTS: usize = 5;

/// HTTP transport using reqwest.
///
/// Returns every HTTP status as a response and only fails on transport
/// errors. Redirects are followed up to five hops, except redirects into
/// loopback or private hosts, which are returned unfollowed. Bodies are read
/// up to the request's `max_body_bytes` and truncated there.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// `timeout` bounds the whole request; per-request timeouts may shorten it.
    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect_policy())
            .build()
            .map_err(|e| AppError::NetworkError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

fn redirect_policy() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if normalize::validate(attempt.url().as_str()).is_err() {
            tracing::warn!(location = %attempt.url(), "Refusing redirect to blocked host");
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: &TransportRequest) -> Result<TransportResponse, AppError> {
        let timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                AppError::Timeout(timeout_ms)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::NetworkError(e.to_string())
            }
        };

        let mut response = self
            .client
            .get(&request.url)
            .header(ACCEPT, &request.accept)
            .header(USER_AGENT, &request.user_agent)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_err)? {
            body.extend_from_slice(&chunk);
            if body.len() >= request.max_body_bytes {
                body.truncate(request.max_body_bytes);
                tracing::debug!(url = %request.url, limit = request.max_body_bytes, "Response body truncated at size limit");
                break;
            }
        }

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}
