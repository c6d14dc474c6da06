use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use drape_client::GeminiGenerator;
use drape_core::error::AppError;
use drape_core::models::{GenerationOutput, GenerationRequest};
use drape_core::traits::ImageGenerator;

use crate::integration::common::{PNG_BYTES, spawn};

const MODEL: &str = "test-image-model";

#[derive(Clone, Default)]
struct Captured {
    api_key: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Option<serde_json::Value>>>,
}

fn model_router(status: StatusCode, reply: serde_json::Value, captured: Captured) -> Router {
    Router::new()
        .route(
            "/v1beta/models/{action}",
            post(
                move |State(captured): State<Captured>,
                      headers: HeaderMap,
                      axum::Json(body): axum::Json<serde_json::Value>| {
                    let reply = reply.clone();
                    async move {
                        *captured.api_key.lock().unwrap() = headers
                            .get("x-goog-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        *captured.body.lock().unwrap() = Some(body);
                        (status, axum::Json(reply))
                    }
                },
            ),
        )
        .with_state(captured)
}

fn generation_request() -> GenerationRequest {
    GenerationRequest {
        image_bytes: PNG_BYTES.to_vec(),
        mime_type: "image/png".into(),
        prompt: "swap the jacket for a trench coat".into(),
    }
}

#[tokio::test]
async fn image_reply_is_decoded() {
    let captured = Captured::default();
    let reply = serde_json::json!({
        "candidates": [{"content": {"parts": [
            {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgoAAAANSUhEUg=="}}
        ]}}]
    });
    let server = spawn(model_router(StatusCode::OK, reply, captured.clone())).await;
    let generator =
        GeminiGenerator::with_base_url("secret-key", MODEL, &server.url("/v1beta")).unwrap();

    let output = generator.generate(&generation_request()).await.unwrap();

    assert_eq!(
        output,
        GenerationOutput::Image {
            bytes: PNG_BYTES.to_vec(),
            mime_type: "image/png".into(),
        }
    );
    assert_eq!(captured.api_key.lock().unwrap().as_deref(), Some("secret-key"));
    let body = captured.body.lock().unwrap().clone().unwrap();
    assert_eq!(
        body["contents"][0]["parts"][1]["text"],
        "swap the jacket for a trench coat"
    );
}

#[tokio::test]
async fn rate_limit_is_mapped() {
    let reply = serde_json::json!({"error": {"message": "quota exceeded"}});
    let server = spawn(model_router(
        StatusCode::TOO_MANY_REQUESTS,
        reply,
        Captured::default(),
    ))
    .await;
    let generator =
        GeminiGenerator::with_base_url("secret-key", MODEL, &server.url("/v1beta")).unwrap();

    let err = generator.generate(&generation_request()).await.unwrap_err();

    assert!(matches!(err, AppError::RateLimitExceeded));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn server_error_is_retryable_with_api_message() {
    let reply = serde_json::json!({"error": {"message": "model overloaded"}});
    let server = spawn(model_router(
        StatusCode::SERVICE_UNAVAILABLE,
        reply,
        Captured::default(),
    ))
    .await;
    let generator =
        GeminiGenerator::with_base_url("secret-key", MODEL, &server.url("/v1beta")).unwrap();

    let err = generator.generate(&generation_request()).await.unwrap_err();

    match err {
        AppError::GenerationError {
            message,
            status_code,
            retryable,
        } => {
            assert_eq!(message, "model overloaded");
            assert_eq!(status_code, 503);
            assert!(retryable);
        }
        other => panic!("expected generation error, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_request_is_not_retryable() {
    let reply = serde_json::json!({"error": {"message": "invalid image"}});
    let server = spawn(model_router(
        StatusCode::BAD_REQUEST,
        reply,
        Captured::default(),
    ))
    .await;
    let generator =
        GeminiGenerator::with_base_url("secret-key", MODEL, &server.url("/v1beta")).unwrap();

    let err = generator.generate(&generation_request()).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::GenerationError {
            status_code: 400,
            retryable: false,
            ..
        }
    ));
}
