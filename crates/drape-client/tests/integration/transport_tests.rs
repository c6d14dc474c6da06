use std::time::Duration;

use drape_client::ReqwestTransport;
use drape_core::content::{IMAGE_BODY_LIMIT, MAX_IMAGE_BYTES};
use drape_core::error::{AppError, ErrorKind};
use drape_core::normalize::{NormalizedUrl, UrlHint};
use drape_core::relay::{RelayConfig, RelayEndpoint};
use drape_core::strategy::FetchContext;
use drape_core::traits::{HttpTransport, TransportRequest};
use drape_core::{BackoffConfig, ImagePipeline, PipelineConfig, Strategy};
use url::Url;

use crate::integration::common::{PNG_BYTES, image_host, spawn};

fn request(url: String) -> TransportRequest {
    TransportRequest {
        url,
        accept: "image/*".into(),
        user_agent: "drape-test/1.0".into(),
        timeout: Duration::from_secs(2),
        max_body_bytes: IMAGE_BODY_LIMIT,
    }
}

/// Build a target directly; `normalize::validate` refuses loopback hosts.
fn loopback_target(url: &str) -> NormalizedUrl {
    let resolved_url = Url::parse(url).unwrap();
    NormalizedUrl {
        raw_input: url.to_string(),
        hostname: resolved_url.host_str().unwrap().to_string(),
        resolved_url,
        hint: UrlHint::DirectImage,
    }
}

fn envelope_relays(template: String) -> RelayConfig {
    RelayConfig {
        reliable: vec![],
        image: vec![],
        cors_bypass: vec![RelayEndpoint::encoded("local-envelope", template)],
    }
}

#[tokio::test]
async fn returns_body_and_content_type() {
    let server = spawn(image_host()).await;
    let transport = ReqwestTransport::new().unwrap();

    let response = transport.get(&request(server.url("/image.png"))).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("image/png"));
    assert_eq!(response.body, PNG_BYTES);
}

#[tokio::test]
async fn error_status_is_a_response_not_an_error() {
    let server = spawn(image_host()).await;
    let transport = ReqwestTransport::new().unwrap();

    let response = transport.get(&request(server.url("/missing"))).await.unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
    assert_eq!(response.body, b"not here");
}

#[tokio::test]
async fn sends_accept_and_user_agent() {
    let server = spawn(image_host()).await;
    let transport = ReqwestTransport::new().unwrap();

    let response = transport.get(&request(server.url("/headers"))).await.unwrap();
    let echoed: serde_json::Value = serde_json::from_slice(&response.body).unwrap();

    assert_eq!(echoed["accept"], "image/*");
    assert_eq!(echoed["user_agent"], "drape-test/1.0");
}

#[tokio::test]
async fn per_request_timeout_maps_to_timeout() {
    let server = spawn(image_host()).await;
    let transport = ReqwestTransport::new().unwrap();
    let mut req = request(server.url("/slow"));
    req.timeout = Duration::from_millis(200);

    let err = transport.get(&req).await.unwrap_err();

    assert!(matches!(err, AppError::Timeout(200)), "got {err:?}");
}

#[tokio::test]
async fn connection_refused_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let transport = ReqwestTransport::new().unwrap();

    let err = transport
        .get(&request(format!("http://{addr}/image.png")))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NetworkError);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn redirect_into_loopback_is_not_followed() {
    let server = spawn(image_host()).await;
    let transport = ReqwestTransport::new().unwrap();

    let response = transport.get(&request(server.url("/redirect"))).await.unwrap();

    assert_eq!(response.status, 307);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn direct_fetch_strategy_over_http() {
    let server = spawn(image_host()).await;
    let transport = ReqwestTransport::new().unwrap();
    let relays = RelayConfig::default();
    let ctx = FetchContext {
        transport: &transport,
        relays: &relays,
        user_agent: "drape-test/1.0",
        timeout: Duration::from_secs(2),
    };

    let image = Strategy::DirectFetch
        .fetch(&ctx, &loopback_target(&server.url("/image.png")))
        .await
        .unwrap();
    assert_eq!(image.bytes, PNG_BYTES);

    let err = Strategy::DirectFetch
        .fetch(&ctx, &loopback_target(&server.url("/missing")))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::HttpStatus { status: 404, .. }));

    let err = Strategy::DirectFetch
        .fetch(&ctx, &loopback_target(&server.url("/empty")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyResponse);
}

#[tokio::test]
async fn pipeline_decodes_json_envelope_from_relay() {
    let server = spawn(image_host()).await;
    let config = PipelineConfig::default()
        .with_backoff(BackoffConfig::none())
        .with_strategies(vec![Strategy::CorsBypassRelay])
        .with_relays(envelope_relays(server.url("/envelope?target={url}")));
    let pipeline = ImagePipeline::new(ReqwestTransport::new().unwrap(), config);

    let result = pipeline.extract("shop.test/products/42.png").await.unwrap();

    assert_eq!(result.strategy_used, Strategy::CorsBypassRelay);
    assert_eq!(result.image_bytes, PNG_BYTES);
    assert_eq!(result.mime_type, "image/png");
    assert_eq!(result.source_url, "https://shop.test/products/42.png");
    assert_eq!(result.attempts.len(), 1);
}

#[tokio::test]
async fn pipeline_reports_relay_http_errors() {
    let server = spawn(image_host()).await;
    let config = PipelineConfig::default()
        .with_backoff(BackoffConfig::none())
        .with_strategies(vec![Strategy::CorsBypassRelay])
        .with_relays(envelope_relays(server.url("/missing?target={url}")));
    let pipeline = ImagePipeline::new(ReqwestTransport::new().unwrap(), config);

    let err = pipeline.extract("https://shop.test/a.png").await.unwrap_err();

    let AppError::AllStrategiesExhausted(failure) = err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert_eq!(failure.attempts.len(), 1);
    assert_eq!(failure.attempts[0].error_kind, Some(ErrorKind::HttpStatusError));
    assert!(!failure.suggestions.is_empty());
}

#[tokio::test]
async fn body_is_cut_at_request_limit() {
    let server = spawn(image_host()).await;
    let transport = ReqwestTransport::new().unwrap();
    let mut req = request(server.url("/image.png"));
    req.max_body_bytes = 8;

    let response = transport.get(&req).await.unwrap();

    assert_eq!(response.body, &PNG_BYTES[..8]);
}

#[tokio::test]
async fn large_image_survives_base64_envelope() {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let mut image = PNG_BYTES.to_vec();
    image.resize(16 * 1024 * 1024, 0);
    assert!(image.len() < MAX_IMAGE_BYTES);
    let envelope = serde_json::json!({
        "contents": format!("data:image/png;base64,{}", STANDARD.encode(&image)),
        "status": { "http_code": 200 }
    })
    .to_string();

    let router = axum::Router::new().route(
        "/get",
        axum::routing::get(move || {
            let envelope = envelope.clone();
            async move {
                (
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    envelope,
                )
            }
        }),
    );
    let server = spawn(router).await;
    let config = PipelineConfig::default()
        .with_backoff(BackoffConfig::none())
        .with_timeout(Duration::from_secs(30))
        .with_strategies(vec![Strategy::CorsBypassRelay])
        .with_relays(envelope_relays(server.url("/get?url={url}")));
    let pipeline = ImagePipeline::new(ReqwestTransport::new().unwrap(), config);

    let result = pipeline.extract("https://shop.test/hero.png").await.unwrap();

    assert_eq!(result.byte_length, image.len());
    assert_eq!(result.mime_type, "image/png");
}
