//! Upstream response envelopes.
//!
//! The two supported provider families wrap the generated text differently:
//!
//! - OpenAI-compatible APIs (OpenAI, OpenRouter): `choices[0].message.content`
//! - Gemini: `candidates[0].content.parts[*].text`
//!
//! Each client deserializes into its own variant of [`UpstreamResponse`];
//! [`UpstreamResponse::normalize`] is the single place that turns either
//! shape into the content string the rest of the crate works with.
//! Missing fields deserialize to empty values so that a structurally odd
//! but successful response surfaces as `MalformedResponse` (retryable)
//! rather than a hard decode error.

use serde::Deserialize;

use crate::{MimirError, Result};

/// Raw response from an upstream provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamResponse {
    Choices(ChoicesEnvelope),
    Candidates(CandidatesEnvelope),
}

/// Prompt/completion token counts reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

// ============================================================================
// OpenAI-compatible shape
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChoicesEnvelope {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<ChoicesUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChoicesUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

// ============================================================================
// Gemini shape
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatesEnvelope {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<CandidatesUsage>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: CandidateContent,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatesUsage {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

// ============================================================================
// Normalization
// ============================================================================

impl UpstreamResponse {
    /// Extract the generated text.
    ///
    /// Returns `MalformedResponse` when the envelope has no candidate/choice
    /// or the content is empty.
    pub fn normalize(self) -> Result<String> {
        let content = match self {
            UpstreamResponse::Choices(env) => {
                let choice = env
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| MimirError::MalformedResponse("no choices in response".into()))?;
                match choice.message.content {
                    Some(text) => text,
                    None => {
                        return Err(MimirError::MalformedResponse(format!(
                            "choice has no content (finish_reason: {})",
                            choice.finish_reason.as_deref().unwrap_or("unknown")
                        )));
                    }
                }
            }
            UpstreamResponse::Candidates(env) => {
                if let Some(reason) = env.prompt_feedback.and_then(|f| f.block_reason) {
                    return Err(MimirError::MalformedResponse(format!(
                        "prompt blocked: {reason}"
                    )));
                }
                let candidate = env.candidates.into_iter().next().ok_or_else(|| {
                    MimirError::MalformedResponse("no candidates in response".into())
                })?;
                let text: String = candidate
                    .content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect();
                if text.is_empty() {
                    return Err(MimirError::MalformedResponse(format!(
                        "candidate has no text (finish_reason: {})",
                        candidate.finish_reason.as_deref().unwrap_or("unknown")
                    )));
                }
                text
            }
        };

        if content.trim().is_empty() {
            return Err(MimirError::MalformedResponse("empty content".into()));
        }
        Ok(content)
    }

    /// Token usage, if the upstream reported it.
    pub fn usage(&self) -> Option<TokenUsage> {
        match self {
            UpstreamResponse::Choices(env) => env.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            UpstreamResponse::Candidates(env) => env.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            }),
        }
    }
}

/// Error object some providers return in the body, even with a 2xx status.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: String,
    /// Numeric HTTP-like code (Gemini, OpenRouter).
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    /// Symbolic status, e.g. `RESOURCE_EXHAUSTED` (Gemini).
    #[serde(default)]
    pub status: Option<String>,
}

impl ErrorBody {
    /// Classify into the crate taxonomy, given the HTTP status it came with.
    pub(crate) fn into_error(self, http_status: u16) -> MimirError {
        let code = self
            .code
            .as_ref()
            .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .and_then(|c| u16::try_from(c).ok());
        let status = match code {
            Some(c) if http_status < 400 => c,
            _ => http_status,
        };
        let message = match self.status {
            Some(s) => format!("{s}: {}", self.message),
            None => self.message,
        };
        MimirError::from_upstream_message(status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_picks_choices() {
        let resp: UpstreamResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "{\"score\": 1}"}}]
        }))
        .unwrap();
        assert!(matches!(resp, UpstreamResponse::Choices(_)));
    }

    #[test]
    fn untagged_picks_candidates() {
        let resp: UpstreamResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "hi"}]}}]
        }))
        .unwrap();
        assert!(matches!(resp, UpstreamResponse::Candidates(_)));
    }

    #[test]
    fn error_body_code_overrides_ok_status() {
        let body: ErrorEnvelope = serde_json::from_value(json!({
            "error": {"message": "slow down", "code": 429}
        }))
        .unwrap();
        assert!(matches!(
            body.error.into_error(200),
            MimirError::RateLimited { .. }
        ));
    }

    #[test]
    fn error_body_gemini_status() {
        let body: ErrorEnvelope = serde_json::from_value(json!({
            "error": {"code": 400, "message": "bad", "status": "INVALID_ARGUMENT"}
        }))
        .unwrap();
        match body.error.into_error(400) {
            MimirError::Api { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("INVALID_ARGUMENT"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
