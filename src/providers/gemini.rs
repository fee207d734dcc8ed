//! Google Gemini `generateContent` client.
//!
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::envelope::{CandidatesEnvelope, UpstreamResponse};
use super::http::{DEFAULT_REQUEST_TIMEOUT, build_client, read_json};
use super::traits::CompletionProvider;
use crate::types::CompletionRequest;
use crate::{MimirError, Result};

/// Default base URL for the Gemini API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the Gemini API.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl GeminiClient {
    /// Create a new Gemini client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, GEMINI_BASE_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MimirError::Configuration("API key is empty".into()));
        }
        Ok(Self {
            api_key,
            http: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<UpstreamResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: [TextPart {
                    text: &request.system,
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [TextPart {
                    text: &request.content,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                response_mime_type: request.json_response.then_some("application/json"),
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let value = read_json(response).await?;
        let envelope: CandidatesEnvelope = serde_json::from_value(value)
            .map_err(|e| MimirError::MalformedResponse(format!("unexpected envelope: {e}")))?;
        Ok(UpstreamResponse::Candidates(envelope))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}
