use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use drape_core::error::AppError;
use drape_core::models::{GenerationOutput, GenerationRequest};
use drape_core::traits::ImageGenerator;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a fashion stylist. Use the supplied garment photo as the reference and follow the user's styling request. Return an edited image when possible, otherwise a short description of the look.";

/// Client for the Gemini `generateContent` REST endpoint.
///
/// Sends the source image as inline base64 data together with the prompt
/// and asks for text and image output.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    system_instruction: String,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, model: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, model: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(api_key, model, base_url, DEFAULT_GENERATION_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.api_key, &self.model, &self.base_url, timeout)
            .map(|g| g.with_system_instruction(self.system_instruction))
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigError("Generation API key is empty".into()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::NetworkError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

// ---- Gemini API types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn build_request(request: &GenerationRequest, system_instruction: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part {
                    inline_data: Some(InlineData {
                        mime_type: request.mime_type.clone(),
                        data: STANDARD.encode(&request.image_bytes),
                    }),
                    ..Default::default()
                },
                Part {
                    text: Some(request.prompt.clone()),
                    ..Default::default()
                },
            ],
        }],
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: Some(system_instruction.to_string()),
                ..Default::default()
            }],
        },
        generation_config: GenerationConfig {
            response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
        },
    }
}

/// Prefer the first image part; otherwise join the text parts.
fn parse_output(response: GenerateResponse) -> Result<GenerationOutput, AppError> {
    let parts: Vec<Part> = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut texts = Vec::new();
    for part in parts {
        if let Some(inline) = part.inline_data {
            let bytes = STANDARD.decode(inline.data.as_bytes()).map_err(|e| {
                AppError::GenerationError {
                    message: format!("Model returned invalid base64 image data: {e}"),
                    status_code: 200,
                    retryable: false,
                }
            })?;
            return Ok(GenerationOutput::Image {
                bytes,
                mime_type: inline.mime_type,
            });
        }
        if let Some(text) = part.text {
            texts.push(text);
        }
    }

    let text = texts.join("\n").trim().to_string();
    if text.is_empty() {
        return Err(AppError::GenerationError {
            message: "Empty response from model".into(),
            status_code: 200,
            retryable: false,
        });
    }
    Ok(GenerationOutput::Text { text })
}

impl ImageGenerator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, AppError> {
        let body = build_request(request, &self.system_instruction);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs.saturating_mul(1000))
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();

            if status_code == 429 {
                return Err(AppError::RateLimitExceeded);
            }

            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));

            return Err(AppError::GenerationError {
                message,
                status_code,
                retryable: status_code >= 500,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            AppError::GenerationError {
                message: format!("Failed to parse model response: {e}"),
                status_code: status.as_u16(),
                retryable: false,
            }
        })?;

        parse_output(parsed)
    }
}
