//! Core TextAnalyzer trait

use async_trait::async_trait;
use tracing::warn;

use crate::{AnalysisResult, AnalyzeParams, MimirError, Result};

/// The call boundary for callers that want text analyzed.
///
/// Implementations are cache-transparent: repeating a call with identical
/// content and parameters within the cache TTL returns the earlier result
/// without contacting the upstream.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Analyze `content` under `params.instruction`, chunking and merging
    /// as needed.
    ///
    /// Fails with `Configuration` or `AllChunksFailed`; per-request errors
    /// are retried internally and surface only through those two.
    async fn analyze_text(&self, content: &str, params: &AnalyzeParams)
    -> Result<AnalysisResult>;

    /// Ask for a single numeric score for `content`.
    async fn scalar_score(&self, content: &str) -> Result<f64>;

    /// Like [`scalar_score`](Self::scalar_score), but degrades to `default`
    /// when the upstream could not produce a score.
    ///
    /// Configuration errors still propagate.
    async fn scalar_score_or(&self, content: &str, default: f64) -> Result<f64> {
        match self.scalar_score(content).await {
            Ok(score) => Ok(score),
            Err(e @ MimirError::Configuration(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, default, "scoring failed, using fallback score");
                Ok(default)
            }
        }
    }
}
