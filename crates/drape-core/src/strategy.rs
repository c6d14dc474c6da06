use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::content::{IMAGE_BODY_LIMIT, RELAY_BODY_LIMIT};
use crate::error::AppError;
use crate::models::FetchedImage;
use crate::normalize::{self, NormalizedUrl};
use crate::relay::{self, EnvelopePayload, ProxyResponseShape, RelayConfig, RelayEndpoint};
use crate::traits::{HttpTransport, TransportRequest};

const ACCEPT_IMAGE: &str = "image/avif,image/webp,image/apng,image/*,*/*;q=0.8";
const ACCEPT_ANY: &str = "*/*";

/// One independent way of acquiring image bytes from a URL.
///
/// Variants are listed in the default priority order: cheapest and most
/// likely to succeed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Plain GET with image `Accept` headers.
    DirectFetch,
    /// GET whose status is ignored; any non-empty body is a tentative hit.
    OpaqueFetch,
    /// General-purpose relays that usually return raw bytes.
    ReliableRelay,
    /// Image-resizing relays.
    ImageRelay,
    /// CORS-bypass relays, including JSON-envelope ones.
    CorsBypassRelay,
}

impl Strategy {
    pub const DEFAULT_ORDER: [Strategy; 5] = [
        Strategy::DirectFetch,
        Strategy::OpaqueFetch,
        Strategy::ReliableRelay,
        Strategy::ImageRelay,
        Strategy::CorsBypassRelay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::DirectFetch => "direct_fetch",
            Strategy::OpaqueFetch => "opaque_fetch",
            Strategy::ReliableRelay => "reliable_relay",
            Strategy::ImageRelay => "image_relay",
            Strategy::CorsBypassRelay => "cors_bypass_relay",
        }
    }

    pub fn is_relay(self) -> bool {
        matches!(
            self,
            Strategy::ReliableRelay | Strategy::ImageRelay | Strategy::CorsBypassRelay
        )
    }

    /// Run this strategy once against `target`.
    ///
    /// The caller owns the deadline; `ctx.timeout` is only forwarded to the
    /// transport as a per-request bound.
    pub async fn fetch<T: HttpTransport>(
        self,
        ctx: &FetchContext<'_, T>,
        target: &NormalizedUrl,
    ) -> Result<FetchedImage, AppError> {
        match self {
            Strategy::DirectFetch => direct_fetch(ctx, &target.resolved_url).await,
            Strategy::OpaqueFetch => opaque_fetch(ctx, &target.resolved_url).await,
            Strategy::ReliableRelay | Strategy::ImageRelay | Strategy::CorsBypassRelay => {
                relay_fetch(ctx, self, target).await
            }
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a strategy needs besides the target URL.
pub struct FetchContext<'a, T> {
    pub transport: &'a T,
    pub relays: &'a RelayConfig,
    pub user_agent: &'a str,
    pub timeout: Duration,
}

impl<T> FetchContext<'_, T> {
    fn request(&self, url: &str, accept: &str, max_body_bytes: usize) -> TransportRequest {
        TransportRequest {
            url: url.to_string(),
            accept: accept.to_string(),
            user_agent: self.user_agent.to_string(),
            timeout: self.timeout,
            max_body_bytes,
        }
    }
}

async fn direct_fetch<T: HttpTransport>(
    ctx: &FetchContext<'_, T>,
    url: &Url,
) -> Result<FetchedImage, AppError> {
    let response = ctx
        .transport
        .get(&ctx.request(url.as_str(), ACCEPT_IMAGE, IMAGE_BODY_LIMIT))
        .await?;

    if !response.is_success() {
        return Err(AppError::HttpStatus {
            status: response.status,
            url: url.to_string(),
        });
    }
    if response.body.is_empty() {
        return Err(AppError::EmptyResponse(format!("{url} returned no body")));
    }

    Ok(FetchedImage::new(response.body, response.content_type))
}

async fn opaque_fetch<T: HttpTransport>(
    ctx: &FetchContext<'_, T>,
    url: &Url,
) -> Result<FetchedImage, AppError> {
    let response = ctx
        .transport
        .get(&ctx.request(url.as_str(), ACCEPT_ANY, IMAGE_BODY_LIMIT))
        .await?;

    if response.body.is_empty() {
        return Err(AppError::EmptyResponse(format!(
            "{url} returned no body (HTTP {})",
            response.status
        )));
    }

    Ok(FetchedImage::new(response.body, response.content_type))
}

async fn relay_fetch<T: HttpTransport>(
    ctx: &FetchContext<'_, T>,
    strategy: Strategy,
    target: &NormalizedUrl,
) -> Result<FetchedImage, AppError> {
    let endpoints = ctx.relays.for_strategy(strategy);
    let mut last_error =
        AppError::EmptyResponse(format!("no relay endpoints configured for {strategy}"));

    for endpoint in endpoints {
        match fetch_via_relay(ctx, endpoint, target).await {
            Ok(image) => {
                tracing::debug!(%strategy, relay = %endpoint.name, bytes = image.byte_length(), "Relay answered");
                return Ok(image);
            }
            Err(e) => {
                tracing::warn!(%strategy, relay = %endpoint.name, error = %e, "Relay failed");
                last_error = e;
            }
        }
    }

    Err(last_error)
}

async fn fetch_via_relay<T: HttpTransport>(
    ctx: &FetchContext<'_, T>,
    endpoint: &RelayEndpoint,
    target: &NormalizedUrl,
) -> Result<FetchedImage, AppError> {
    let relay_url = endpoint.wrap(target.as_str());
    let response = ctx
        .transport
        .get(&ctx.request(&relay_url, ACCEPT_ANY, RELAY_BODY_LIMIT))
        .await?;

    if !response.is_success() {
        return Err(AppError::HttpStatus {
            status: response.status,
            url: relay_url,
        });
    }

    match relay::classify(response.content_type.as_deref(), &response.body) {
        ProxyResponseShape::Raw => {
            if response.body.is_empty() {
                return Err(AppError::EmptyResponse(format!(
                    "relay {} returned no body",
                    endpoint.name
                )));
            }
            Ok(FetchedImage::new(response.body, response.content_type))
        }
        ProxyResponseShape::JsonEnvelope => {
            match relay::parse_envelope(&response.body, target.as_str())? {
                EnvelopePayload::DataUri(uri) => relay::decode_data_uri(&uri),
                EnvelopePayload::Html(html) => follow_page(ctx, &html, target).await,
            }
        }
        ProxyResponseShape::HtmlPage => {
            let html = String::from_utf8_lossy(&response.body).into_owned();
            follow_page(ctx, &html, target).await
        }
    }
}

/// Direct-fetch the first usable image reference in a relayed page.
async fn follow_page<T: HttpTransport>(
    ctx: &FetchContext<'_, T>,
    html: &str,
    target: &NormalizedUrl,
) -> Result<FetchedImage, AppError> {
    let discovered = relay::discover_image_urls(html, &target.resolved_url)
        .into_iter()
        .find_map(|candidate| normalize::validate(candidate.as_str()).ok())
        .ok_or_else(|| {
            AppError::EmptyResponse(format!(
                "relayed page for {} has no image reference",
                target.as_str()
            ))
        })?;

    tracing::debug!(discovered = %discovered.as_str(), "Following image found in relayed page");
    direct_fetch(ctx, &discovered.resolved_url).await
}
