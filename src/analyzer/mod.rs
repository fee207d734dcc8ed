//! The analyzer: cache, chunking, execution and merging behind one call.
//!
//! One `analyze_text` call flows as follows:
//!
//! 1. Look up `(operation, content, params, provider, models)` in the cache.
//! 2. On a miss, estimate the content. If it fits the per-request content
//!    budget it is sent as one chunk; otherwise it is split into chunks
//!    (or truncated, with [`OverflowStrategy::Truncate`]).
//! 3. The executor sends the chunks in order, each independently rate
//!    limited, retried and failed over.
//! 4. The answers are merged and the result is cached.

mod builder;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

pub use builder::{DEFAULT_SCORE_INSTRUCTION, Mimir, MimirBuilder};

use crate::cache::{ResponseCache, cache_key};
use crate::chunker::{CostBudget, split_into_chunks, truncate_to_token_budget};
use crate::merge::merge_results;
use crate::providers::{Executor, RateLimiter};
use crate::tokenizer::TokenEstimator;
use crate::traits::TextAnalyzer;
use crate::types::{
    AnalysisResult, AnalyzeParams, Chunk, DEFAULT_TEMPERATURE, OverflowStrategy, RequestTemplate,
};
use crate::{MimirError, Result};

/// Resilient text analyzer over one upstream. Build with [`Mimir::builder`].
///
/// Cheap to share behind an `Arc`; concurrent calls queue on the shared
/// rate limiter.
pub struct Analyzer {
    executor: Executor,
    limiter: Arc<RateLimiter>,
    estimator: Arc<dyn TokenEstimator>,
    budget: CostBudget,
    cache: ResponseCache<AnalysisResult>,
    score_instruction: String,
}

impl Analyzer {
    pub(crate) fn new(
        executor: Executor,
        limiter: Arc<RateLimiter>,
        estimator: Arc<dyn TokenEstimator>,
        budget: CostBudget,
        cache: ResponseCache<AnalysisResult>,
        score_instruction: String,
    ) -> Self {
        Self {
            executor,
            limiter,
            estimator,
            budget,
            cache,
            score_instruction,
        }
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache<AnalysisResult> {
        &self.cache
    }

    /// The rate limiter, shared with any analyzer built from the same one.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn budget(&self) -> &CostBudget {
        &self.budget
    }

    /// Cache key for one call. Covers everything that can change the answer.
    pub fn cache_key(&self, operation: &str, content: &str, params: &AnalyzeParams) -> u64 {
        let temperature = params
            .temperature
            .map(|t| t.to_string())
            .unwrap_or_default();
        let max_output = params
            .max_output_tokens
            .map(|t| t.to_string())
            .unwrap_or_default();
        let overflow = match params.overflow {
            OverflowStrategy::Chunk => "chunk",
            OverflowStrategy::Truncate => "truncate",
        };
        let route = self.executor.route();
        cache_key(
            operation,
            &[
                content,
                &params.instruction,
                &temperature,
                &max_output,
                overflow,
                self.executor.provider_name(),
                &route.primary,
                route.fallback.as_deref().unwrap_or(""),
            ],
        )
    }

    async fn cached(
        &self,
        operation: &'static str,
        content: &str,
        params: &AnalyzeParams,
    ) -> Result<AnalysisResult> {
        let key = self.cache_key(operation, content, params);
        self.cache
            .get_or_try_insert_with(key, None, || self.compute(content, params))
            .await
    }

    /// Cache miss path: plan chunks, execute, merge.
    async fn compute(&self, content: &str, params: &AnalyzeParams) -> Result<AnalysisResult> {
        let max_output = params
            .max_output_tokens
            .unwrap_or(self.budget.max_response_tokens);
        let template = RequestTemplate::new(params.instruction.as_str(), max_output)
            .temperature(params.temperature.unwrap_or(DEFAULT_TEMPERATURE));

        let budget = self.budget.clone().max_response_tokens(max_output);
        let content_budget = budget.content_tokens(self.estimator.estimate_tokens(&template.system));
        let chunks = self.plan(content, content_budget, params.overflow);

        let results = self.executor.execute_all(&chunks, &template).await;
        let merged = merge_results(results)?;
        if merged.is_partial() {
            warn!(
                failed = ?merged.failed_chunks,
                chunks = merged.chunks,
                "some chunks failed and were left out of the merge"
            );
        }
        Ok(merged)
    }

    fn plan(&self, content: &str, content_budget: usize, overflow: OverflowStrategy) -> Vec<Chunk> {
        let estimated = self.estimator.estimate_tokens(content);
        if estimated <= content_budget {
            debug!(estimated, content_budget, "content fits in a single request");
            return vec![Chunk {
                index: 0,
                text: content.to_string(),
                estimated_tokens: estimated,
            }];
        }

        match overflow {
            OverflowStrategy::Chunk => {
                let chunks = split_into_chunks(self.estimator.as_ref(), content, content_budget);
                info!(
                    estimated,
                    content_budget,
                    chunks = chunks.len(),
                    "content exceeds request budget, splitting"
                );
                chunks
            }
            OverflowStrategy::Truncate => {
                let text = truncate_to_token_budget(self.estimator.as_ref(), content, content_budget);
                let estimated_tokens = self.estimator.estimate_tokens(&text);
                info!(
                    estimated,
                    kept = estimated_tokens,
                    "content exceeds request budget, truncating"
                );
                vec![Chunk {
                    index: 0,
                    text,
                    estimated_tokens,
                }]
            }
        }
    }
}

#[async_trait]
impl TextAnalyzer for Analyzer {
    #[instrument(skip(self, content, params), fields(content_bytes = content.len()))]
    async fn analyze_text(
        &self,
        content: &str,
        params: &AnalyzeParams,
    ) -> Result<AnalysisResult> {
        self.cached("analyze", content, params).await
    }

    #[instrument(skip(self, content), fields(content_bytes = content.len()))]
    async fn scalar_score(&self, content: &str) -> Result<f64> {
        let params = AnalyzeParams::new(self.score_instruction.as_str());
        let result = self.cached("score", content, &params).await?;
        result
            .score()
            .ok_or_else(|| MimirError::MalformedResponse("merged answer has no score".into()))
    }
}
