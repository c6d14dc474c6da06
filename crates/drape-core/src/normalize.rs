//! URL normalization, SSRF guard, and hint classification.

use std::net::IpAddr;

use serde::Serialize;
use url::{Host, Url};

use crate::error::AppError;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

const CDN_HOSTS: &[&str] = &[
    "images.unsplash.com",
    "cdn.shopify.com",
    "i.imgur.com",
    "res.cloudinary.com",
    "imgix.net",
    "cloudfront.net",
    "i.pinimg.com",
    "media-amazon.com",
    "googleusercontent.com",
];

const ECOMMERCE_HOSTS: &[&str] = &[
    "amazon.com",
    "amazon.in",
    "amazon.co.uk",
    "myntra.com",
    "flipkart.com",
    "ajio.com",
    "zara.com",
    "hm.com",
    "asos.com",
    "nordstrom.com",
    "uniqlo.com",
    "shein.com",
];

const SOCIAL_HOSTS: &[&str] = &[
    "instagram.com",
    "facebook.com",
    "pinterest.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "threads.net",
];

/// Category of a URL, used only to tailor failure suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlHint {
    DirectImage,
    KnownCdn,
    EcommerceProduct,
    SocialMedia,
    Unknown,
}

impl UrlHint {
    pub fn as_str(self) -> &'static str {
        match self {
            UrlHint::DirectImage => "direct_image",
            UrlHint::KnownCdn => "known_cdn",
            UrlHint::EcommerceProduct => "ecommerce_product",
            UrlHint::SocialMedia => "social_media",
            UrlHint::Unknown => "unknown",
        }
    }

    /// Remediation tips specific to this category.
    pub fn suggestions(self) -> Vec<String> {
        let tips: &[&str] = match self {
            UrlHint::DirectImage => &[
                "The link points at an image file but the host refused to serve it; it may require a login or block hotlinking.",
            ],
            UrlHint::KnownCdn => &[
                "CDN links often expire; reopen the page and copy a fresh image address.",
            ],
            UrlHint::EcommerceProduct => &[
                "Product pages render images with scripts; open the product photo in a new tab and copy that address.",
                "Many stores block automated downloads; saving the photo and uploading it works reliably.",
            ],
            UrlHint::SocialMedia => &[
                "Social networks hide images behind login walls; download the photo from the app and upload it.",
                "Profile or post links are not image links; use the image's own address instead.",
            ],
            UrlHint::Unknown => &[],
        };
        tips.iter().map(|s| s.to_string()).collect()
    }
}

impl std::fmt::Display for UrlHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, absolute http(s) URL ready for fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedUrl {
    pub raw_input: String,
    pub resolved_url: Url,
    pub hostname: String,
    pub hint: UrlHint,
}

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        self.resolved_url.as_str()
    }
}

/// Normalize and validate user input as a fetchable image URL.
///
/// Pure: no DNS lookups or network access. Inputs without a scheme get
/// `https://` prepended before parsing.
pub fn validate(input: &str) -> Result<NormalizedUrl, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("URL is empty".into()));
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed =
        Url::parse(&candidate).map_err(|e| AppError::MalformedUrl(format!("{candidate}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::MalformedUrl(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    let hostname = match parsed.host() {
        // `localhost.` and `localhost` name the same host.
        Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_ascii_lowercase(),
        Some(Host::Ipv4(v4)) => v4.to_string(),
        Some(Host::Ipv6(v6)) => v6.to_string(),
        None => return Err(AppError::MalformedUrl(format!("{candidate}: URL has no host"))),
    };

    if is_blocked_host(&hostname) {
        return Err(AppError::BlockedHost(hostname));
    }

    let hint = classify(&parsed, &hostname);

    Ok(NormalizedUrl {
        raw_input: input.to_string(),
        resolved_url: parsed,
        hostname,
        hint,
    })
}

fn has_scheme(input: &str) -> bool {
    match input.find("://") {
        Some(idx) => {
            let scheme = &input[..idx];
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => {
            let lower = input.to_ascii_lowercase();
            lower.starts_with("data:") || lower.starts_with("javascript:")
        }
    }
}

fn is_blocked_host(hostname: &str) -> bool {
    if hostname == "localhost" || hostname.ends_with(".localhost") {
        return true;
    }
    match hostname.parse::<IpAddr>() {
        Ok(ip) => is_private_ip(ip),
        Err(_) => false,
    }
}

/// Check if an IP address is in a private/reserved/link-local range.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()           // 127.0.0.0/8
                || v4.is_private()     // 10/8, 172.16/12, 192.168/16
                || v4.is_link_local()  // 169.254.0.0/16
                || v4.is_unspecified() // 0.0.0.0
                || v4.is_broadcast()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64) // 100.64.0.0/10 (CGN)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xFFC0) == 0xFE80
                || (v6.segments()[0] & 0xFE00) == 0xFC00
                // Covers both `::ffff:a.b.c.d` and the deprecated `::a.b.c.d` forms.
                || match v6.to_ipv4() {
                    Some(v4) => is_private_ip(IpAddr::V4(v4)),
                    None => false,
                }
        }
    }
}

fn host_matches(hostname: &str, candidates: &[&str]) -> bool {
    candidates.iter().any(|candidate| {
        hostname == *candidate
            || hostname
                .strip_suffix(candidate)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

fn classify(url: &Url, hostname: &str) -> UrlHint {
    let path = url.path().to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        UrlHint::DirectImage
    } else if host_matches(hostname, CDN_HOSTS) {
        UrlHint::KnownCdn
    } else if host_matches(hostname, SOCIAL_HOSTS) {
        UrlHint::SocialMedia
    } else if host_matches(hostname, ECOMMERCE_HOSTS) {
        UrlHint::EcommerceProduct
    } else {
        UrlHint::Unknown
    }
}
