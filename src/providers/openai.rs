//! OpenAI-compatible chat completions client.
//!
//! Works against OpenAI itself and any API that mirrors its
//! `POST /chat/completions` contract (OpenRouter, most self-hosted
//! gateways). Responses come back in the `choices` envelope.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::envelope::{ChoicesEnvelope, UpstreamResponse};
use super::http::{DEFAULT_REQUEST_TIMEOUT, build_client, read_json};
use super::traits::CompletionProvider;
use crate::types::CompletionRequest;
use crate::{MimirError, Result};

/// Base URL for OpenRouter.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Base URL for OpenAI.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible chat completion APIs.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    name: String,
    api_key: String,
    http: Client,
    base_url: String,
}

impl OpenAiCompatClient {
    /// Client for OpenRouter.
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url("openrouter", api_key, OPENROUTER_BASE_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client for OpenAI.
    pub fn openai(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url("openai", api_key, OPENAI_BASE_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client with a custom base URL (self-hosted gateways, wiremock).
    pub fn with_base_url(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MimirError::Configuration("API key is empty".into()));
        }
        Ok(Self {
            name: name.into(),
            api_key,
            http: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<UpstreamResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.content,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            response_format: request.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let value = read_json(response).await?;
        let envelope: ChoicesEnvelope = serde_json::from_value(value)
            .map_err(|e| MimirError::MalformedResponse(format!("unexpected envelope: {e}")))?;
        Ok(UpstreamResponse::Choices(envelope))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}
