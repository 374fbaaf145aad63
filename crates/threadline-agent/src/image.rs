//! Image editing through a hosted multimodal model.
//!
//! The gateway hands over the uploaded image and an instruction; the model
//! answers with an edited image, or with text when it declines or explains.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{retry_after_ms, ProviderError};

/// Uploaded image plus the edit instruction.
#[derive(Debug, Clone)]
pub struct ImageEditRequest {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageEditOutcome {
    Image { bytes: Vec<u8>, mime_type: String },
    Text(String),
}

#[async_trait]
pub trait ImageEditor: Send + Sync {
    fn name(&self) -> &str;

    async fn edit(&self, req: &ImageEditRequest) -> Result<ImageEditOutcome, ProviderError>;
}

/// Google Generative Language `generateContent` client.
pub struct GeminiImageEditor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiImageEditor {
    pub fn new(api_key: String, base_url: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            model,
        }
    }
}

#[async_trait]
impl ImageEditor for GeminiImageEditor {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn edit(&self, req: &ImageEditRequest) -> Result<ImageEditOutcome, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        debug!(model = %self.model, bytes = req.bytes.len(), "sending image edit request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request_body(req))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after_ms(resp.headers()),
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_response(body)
    }
}

fn build_request_body(req: &ImageEditRequest) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": req.mime_type, "data": STANDARD.encode(&req.bytes) } },
                { "text": req.prompt },
            ]
        }]
    })
}

/// First candidate's parts, in order: an inline image wins, then text.
fn parse_response(body: GenerateResponse) -> Result<ImageEditOutcome, ProviderError> {
    let parts = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    for part in parts {
        if let Some(inline) = part.inline_data {
            if !inline.data.is_empty() {
                let bytes = STANDARD
                    .decode(inline.data.as_bytes())
                    .map_err(|e| ProviderError::Parse(format!("inline image: {e}")))?;
                return Ok(ImageEditOutcome::Image {
                    bytes,
                    mime_type: inline.mime_type.unwrap_or_else(|| "image/png".to_string()),
                });
            }
        }
        if let Some(text) = part.text.filter(|t| !t.is_empty()) {
            return Ok(ImageEditOutcome::Text(text));
        }
    }

    Err(ProviderError::Parse(
        "no image or text returned by model".to_string(),
    ))
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}
