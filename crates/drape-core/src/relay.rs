//! Proxy relay endpoints and relay response decoding.
//!
//! A relay answers in one of three shapes. [`classify`] decides the shape
//! from the declared content type and the leading bytes; callers then
//! dispatch on the tag:
//!
//! ```text
//! Raw          -> body is the image
//! JsonEnvelope -> {"contents": "data:image/...;base64,..."} or {"contents": "<html>..."}
//! HtmlPage     -> scan og:image / twitter:image / <img src> and fetch the first hit
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::content::{self, ImageFormat};
use crate::error::AppError;
use crate::models::FetchedImage;
use crate::strategy::Strategy;

/// Placeholder replaced by the target URL in a relay template.
const TARGET_PLACEHOLDER: &str = "{url}";

const META_IMAGE_SELECTORS: &[&str] = &[
    r#"meta[property="og:image"]"#,
    r#"meta[name="og:image"]"#,
    r#"meta[property="og:image:url"]"#,
    r#"meta[name="twitter:image"]"#,
    r#"meta[property="twitter:image"]"#,
    r#"meta[name="twitter:image:src"]"#,
];

/// A third-party endpoint that fetches a URL server-side on our behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    pub name: String,
    /// URL containing a `{url}` placeholder.
    pub template: String,
    /// Percent-encode the target before substitution.
    pub encode_target: bool,
}

impl RelayEndpoint {
    pub fn encoded(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            encode_target: true,
        }
    }

    pub fn verbatim(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            encode_target: false,
        }
    }

    /// Build the relay URL that fetches `target`.
    pub fn wrap(&self, target: &str) -> String {
        let target = if self.encode_target {
            url::form_urlencoded::byte_serialize(target.as_bytes()).collect::<String>()
        } else {
            target.to_string()
        };
        self.template.replace(TARGET_PLACEHOLDER, &target)
    }
}

/// Ordered relay endpoints for each relay strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub reliable: Vec<RelayEndpoint>,
    pub image: Vec<RelayEndpoint>,
    pub cors_bypass: Vec<RelayEndpoint>,
}

impl RelayConfig {
    /// Endpoints for a relay strategy, in the order they are tried.
    pub fn for_strategy(&self, strategy: Strategy) -> &[RelayEndpoint] {
        match strategy {
            Strategy::ReliableRelay => &self.reliable,
            Strategy::ImageRelay => &self.image,
            Strategy::CorsBypassRelay => &self.cors_bypass,
            Strategy::DirectFetch | Strategy::OpaqueFetch => &[],
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            reliable: vec![
                RelayEndpoint::encoded("allorigins-raw", "https://api.allorigins.win/raw?url={url}"),
                RelayEndpoint::encoded("corsproxy", "https://corsproxy.io/?url={url}"),
                RelayEndpoint::encoded("codetabs", "https://api.codetabs.com/v1/proxy?quest={url}"),
            ],
            image: vec![
                RelayEndpoint::encoded("weserv", "https://images.weserv.nl/?url={url}"),
                RelayEndpoint::encoded("wsrv", "https://wsrv.nl/?url={url}"),
            ],
            cors_bypass: vec![
                RelayEndpoint::encoded("allorigins-get", "https://api.allorigins.win/get?url={url}"),
                RelayEndpoint::verbatim("thingproxy", "https://thingproxy.freeboard.io/fetch/{url}"),
                RelayEndpoint::verbatim("cors-anywhere", "https://cors-anywhere.herokuapp.com/{url}"),
            ],
        }
    }
}

/// Shape of a successful relay response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyResponseShape {
    Raw,
    JsonEnvelope,
    HtmlPage,
}

/// Decide how to read a relay response. Pure.
pub fn classify(content_type: Option<&str>, body: &[u8]) -> ProxyResponseShape {
    if ImageFormat::sniff(body).is_some() {
        return ProxyResponseShape::Raw;
    }

    let mime = content_type.and_then(content::essence).unwrap_or_default();
    let head = leading_text(body);

    if mime == "application/json" || mime.ends_with("+json") || head.starts_with('{') {
        ProxyResponseShape::JsonEnvelope
    } else if mime == "text/html"
        || mime == "application/xhtml+xml"
        || head.starts_with("<!doctype html")
        || head.starts_with("<html")
    {
        ProxyResponseShape::HtmlPage
    } else {
        ProxyResponseShape::Raw
    }
}

fn leading_text(body: &[u8]) -> String {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let end = (start + 16).min(body.len());
    String::from_utf8_lossy(&body[start..end]).to_ascii_lowercase()
}

#[derive(Deserialize)]
struct RelayEnvelope {
    #[serde(default)]
    contents: Option<String>,
    #[serde(default)]
    status: Option<EnvelopeStatus>,
}

#[derive(Deserialize)]
struct EnvelopeStatus {
    #[serde(default)]
    http_code: Option<u16>,
}

/// Usable content carried inside a JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopePayload {
    DataUri(String),
    Html(String),
}

/// Read the `contents` of a JSON relay envelope.
pub fn parse_envelope(body: &[u8], target: &str) -> Result<EnvelopePayload, AppError> {
    let envelope: RelayEnvelope = serde_json::from_slice(body).map_err(|e| {
        AppError::EmptyResponse(format!("relay returned an unreadable JSON envelope: {e}"))
    })?;

    if let Some(code) = envelope.status.and_then(|s| s.http_code) {
        if !(200..300).contains(&code) {
            return Err(AppError::HttpStatus {
                status: code,
                url: target.to_string(),
            });
        }
    }

    let contents = envelope.contents.unwrap_or_default();
    let contents = contents.trim();
    if contents.starts_with("data:") {
        Ok(EnvelopePayload::DataUri(contents.to_string()))
    } else if contents.starts_with('<') {
        Ok(EnvelopePayload::Html(contents.to_string()))
    } else if contents.is_empty() {
        Err(AppError::EmptyResponse("relay envelope has no contents".into()))
    } else {
        Err(AppError::EmptyResponse(
            "relay envelope contents are neither a data URI nor a page".into(),
        ))
    }
}

/// Decode a base64 `data:` URI into bytes and its declared MIME type.
pub fn decode_data_uri(uri: &str) -> Result<FetchedImage, AppError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| AppError::EmptyResponse("not a data URI".into()))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| AppError::EmptyResponse("data URI has no payload".into()))?;

    let mut params = meta.split(';');
    let mime_type = params
        .next()
        .filter(|m| !m.is_empty())
        .map(|m| m.to_ascii_lowercase());
    if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(AppError::EmptyResponse(
            "data URI is not base64-encoded".into(),
        ));
    }

    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(cleaned).map_err(|e| {
        AppError::EmptyResponse(format!("data URI payload is not valid base64: {e}"))
    })?;
    if bytes.is_empty() {
        return Err(AppError::EmptyResponse("data URI payload is empty".into()));
    }

    Ok(FetchedImage::new(bytes, mime_type))
}

/// Image references found in a page, best candidates first.
///
/// Order: `og:image`, `twitter:image`, then `<img src>` in document order.
/// Relative references are resolved against `base`; non-http(s) references
/// and duplicates are dropped.
pub fn discover_image_urls(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut found = Vec::new();

    for raw in META_IMAGE_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(content) = element.value().attr("content") {
                push_resolved(&mut found, base, content);
            }
        }
    }

    if let Ok(selector) = Selector::parse("img[src]") {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                push_resolved(&mut found, base, src);
            }
        }
    }

    found
}

fn push_resolved(found: &mut Vec<Url>, base: &Url, reference: &str) {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return;
    }
    if let Ok(resolved) = base.join(reference) {
        if matches!(resolved.scheme(), "http" | "https") && !found.contains(&resolved) {
            found.push(resolved);
        }
    }
}
