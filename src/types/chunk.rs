//! Chunk and per-chunk result types

use serde::Serialize;

use crate::MimirError;

/// A bounded slice of the original content, sent as one request.
///
/// Created by the chunker and consumed once by the executor. `index`
/// preserves the original order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub estimated_tokens: usize,
}

/// Outcome of executing one chunk.
///
/// Exactly one of `raw_text` (non-empty on success) or `error` is
/// meaningful. `parsed` is filled in by the merger once the raw text
/// has been decoded.
#[derive(Debug)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub raw_text: String,
    pub parsed: Option<serde_json::Value>,
    pub error: Option<MimirError>,
    /// Model that produced `raw_text`.
    pub model: Option<String>,
}

impl ChunkResult {
    pub fn success(chunk_index: usize, raw_text: String, model: impl Into<String>) -> Self {
        Self {
            chunk_index,
            raw_text,
            parsed: None,
            error: None,
            model: Some(model.into()),
        }
    }

    pub fn failure(chunk_index: usize, error: MimirError) -> Self {
        Self {
            chunk_index,
            raw_text: String::new(),
            parsed: None,
            error: Some(error),
            model: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
