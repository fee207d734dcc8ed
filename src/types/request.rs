//! Upstream request envelope

use serde::Serialize;

/// Default sampling temperature for analysis requests.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// One completion request, as handed to a [`CompletionProvider`](crate::providers::CompletionProvider).
///
/// Deterministic for a given chunk and model: system instruction, content,
/// and generation parameters. Providers translate it into their own wire
/// format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub content: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the upstream to answer with a JSON object.
    pub json_response: bool,
}

/// Everything about a request except the model and the content.
///
/// Shared by all chunks of one call; the executor fills in the model and
/// the (byte-truncated) chunk text per attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestTemplate {
    pub system: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub json_response: bool,
}

impl RequestTemplate {
    pub fn new(system: impl Into<String>, max_output_tokens: u32) -> Self {
        Self {
            system: system.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens,
            json_response: true,
        }
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    /// Concrete request for one model and one piece of content.
    pub fn request(&self, model: &str, content: &str) -> CompletionRequest {
        CompletionRequest {
            model: model.to_string(),
            system: self.system.clone(),
            content: content.to_string(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            json_response: self.json_response,
        }
    }
}
