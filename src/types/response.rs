//! Merged analysis result types

use serde::{Deserialize, Serialize};

/// Shape of a parsed model answer, detected from the first successful chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    /// `{"score": n}`
    Score,
    /// `{"score": n, "matchedSkills": [...], "missingSkills": [...], "feedback": "..."}`
    SkillsGap,
    /// Any other object, merged field by field.
    Analysis,
}

/// Result of an `analyze_text` call after merging all chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Merged JSON answer.
    pub value: serde_json::Value,
    pub shape: ResultShape,
    /// Number of chunks the content was sent as.
    pub chunks: usize,
    /// Indices of chunks that failed and were left out of the merge.
    #[serde(default)]
    pub failed_chunks: Vec<usize>,
    /// Model that served each successful chunk, in chunk order.
    #[serde(default)]
    pub models: Vec<String>,
}

impl AnalysisResult {
    /// The merged `score` field, if the answer has one.
    pub fn score(&self) -> Option<f64> {
        self.value.get("score").and_then(serde_json::Value::as_f64)
    }

    /// Whether some chunks were dropped from the merge.
    pub fn is_partial(&self) -> bool {
        !self.failed_chunks.is_empty()
    }
}
