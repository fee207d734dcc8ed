//! Analysis options and configuration types

use serde::{Deserialize, Serialize};

/// What to do when content does not fit in a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowStrategy {
    /// Split into chunks, execute each, merge the results.
    #[default]
    Chunk,
    /// Shorten the content until it fits and send a single request.
    Truncate,
}

/// Options for a single `analyze_text` call (provider-agnostic).
///
/// The instruction is opaque to mimir: it is sent verbatim as the system
/// message and participates in the cache key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeParams {
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub overflow: OverflowStrategy,
}

impl AnalyzeParams {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Self::default()
        }
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn overflow(mut self, strategy: OverflowStrategy) -> Self {
        self.overflow = strategy;
        self
    }
}
