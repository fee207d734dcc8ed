//! Rate-limited request execution with retry and model fallback.
//!
//! Each chunk runs through an explicit state machine, once per model:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │
//!   ADMIT ──► SEND ──► success ─► done      │
//!                 ├──► retryable ─► BACKOFF ┘  (attempt < max_attempts)
//!                 │        └──── exhausted ──► next model, or chunk failed
//!                 └──► fatal ─► chunk failed   (no retry, no fallback)
//! ```
//!
//! ADMIT goes through the shared [`RateLimiter`], so quota and failure
//! streak are common to every caller of the same upstream. The primary
//! model gets `max_attempts` tries; after that the fallback model (if any)
//! gets the same, starting from a fresh ADMIT. A chunk therefore costs at
//! most `2 × max_attempts` requests.
//!
//! Before ADMIT, the content is truncated to the request byte limit. If
//! nothing of it fits, the chunk fails with `PayloadTooLarge` and no
//! request is sent.
//!
//! Chunks of one call run strictly in index order. A failed chunk is
//! recorded and does not stop its siblings.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::http::DEFAULT_REQUEST_TIMEOUT;
use super::rate_limit::{Permit, RateLimiter};
use super::traits::CompletionProvider;
use crate::chunker::{CostBudget, truncate_to_byte_budget};
use crate::telemetry;
use crate::tokenizer::{HeuristicEstimator, TokenEstimator};
use crate::types::{Chunk, ChunkResult, CompletionRequest, RequestTemplate};
use crate::{MimirError, Result};

/// Primary model and optional fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    pub primary: String,
    pub fallback: Option<String>,
}

impl ModelRoute {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Models in the order they are tried.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallback.as_deref())
    }
}

/// States of one model's attempt loop.
enum State<'a> {
    Admit { attempt: u32 },
    Send { attempt: u32, permit: Permit<'a> },
    Backoff { attempt: u32, delay: Duration },
}

/// How one model's attempt loop ended.
enum ModelOutcome {
    Success(String),
    /// Retryable failures used up all attempts; the fallback may still work.
    Exhausted(MimirError),
    /// Retrying cannot help, on this model or any other.
    Fatal(MimirError),
}

/// Sends chunks to one provider under a shared rate limiter.
pub struct Executor {
    provider: Arc<dyn CompletionProvider>,
    limiter: Arc<RateLimiter>,
    route: ModelRoute,
    estimator: Arc<dyn TokenEstimator>,
    budget: CostBudget,
    timeout: Duration,
}

impl Executor {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        limiter: Arc<RateLimiter>,
        route: ModelRoute,
    ) -> Self {
        Self {
            provider,
            limiter,
            route,
            estimator: Arc::new(HeuristicEstimator::default()),
            budget: CostBudget::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the estimator used for quota accounting.
    pub fn estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Set the budget whose byte limit guards every request.
    pub fn budget(mut self, budget: CostBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn route(&self) -> &ModelRoute {
        &self.route
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Execute chunks one after another, in the order given.
    pub async fn execute_all(&self, chunks: &[Chunk], template: &RequestTemplate) -> Vec<ChunkResult> {
        let mut results = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            results.push(self.execute_chunk(chunk, template).await);
        }
        results
    }

    /// Execute one chunk: primary model first, then the fallback.
    #[instrument(skip(self, chunk, template), fields(chunk = chunk.index, provider = self.provider.name()))]
    pub async fn execute_chunk(&self, chunk: &Chunk, template: &RequestTemplate) -> ChunkResult {
        let max_bytes = self.budget.content_bytes(&template.system);
        let content = truncate_to_byte_budget(self.estimator.as_ref(), &chunk.text, max_bytes);
        let request_bytes = self.estimator.estimate_request_bytes(&content);
        if request_bytes > max_bytes || (content.is_empty() && !chunk.text.is_empty()) {
            warn!(
                original_bytes = chunk.text.len(),
                max_bytes,
                "no content fits the request byte limit"
            );
            metrics::counter!(telemetry::CHUNKS_TOTAL, "status" => "error").increment(1);
            return ChunkResult::failure(
                chunk.index,
                MimirError::PayloadTooLarge(format!(
                    "chunk does not fit the {}-byte request limit ({request_bytes} bytes estimated)",
                    self.budget.max_request_bytes
                )),
            );
        }
        if content.len() < chunk.text.len() {
            warn!(
                original_bytes = chunk.text.len(),
                sent_bytes = content.len(),
                "chunk truncated to fit request byte limit"
            );
        }

        let mut last_err = None;
        for (i, model) in self.route.models().enumerate() {
            if i > 0 {
                info!(model, "primary model exhausted, trying fallback");
                metrics::counter!(telemetry::FALLBACKS_TOTAL,
                    "provider" => self.provider.name().to_owned(),
                )
                .increment(1);
            }
            let request = template.request(model, &content);
            match self.run_model(&request).await {
                ModelOutcome::Success(text) => {
                    metrics::counter!(telemetry::CHUNKS_TOTAL, "status" => "ok").increment(1);
                    return ChunkResult::success(chunk.index, text, model);
                }
                ModelOutcome::Exhausted(e) => {
                    warn!(model, error = %e, "model attempts exhausted");
                    last_err = Some(e);
                }
                ModelOutcome::Fatal(e) => {
                    warn!(model, error = %e, "chunk failed permanently");
                    last_err = Some(e);
                    break;
                }
            }
        }

        metrics::counter!(telemetry::CHUNKS_TOTAL, "status" => "error").increment(1);
        let error = last_err.unwrap_or_else(|| MimirError::Configuration("no model configured".into()));
        ChunkResult::failure(chunk.index, error)
    }

    /// Attempt loop for one model.
    async fn run_model(&self, request: &CompletionRequest) -> ModelOutcome {
        let max_attempts = self.limiter.retry_config().max_attempts.max(1);
        let cost = self.request_cost(request);
        let mut state = State::Admit { attempt: 1 };

        loop {
            state = match state {
                State::Admit { attempt } => match self.limiter.acquire(cost).await {
                    Ok(permit) => State::Send { attempt, permit },
                    Err(e) => return ModelOutcome::Fatal(e),
                },
                State::Send { attempt, permit } => {
                    let start = Instant::now();
                    let result = self.send(request).await;
                    self.record_request(&request.model, start, result.is_ok());

                    match result {
                        Ok(text) => {
                            permit.record_success();
                            debug!(model = %request.model, attempt, "request succeeded");
                            return ModelOutcome::Success(text);
                        }
                        Err(e) if e.is_transient() => {
                            let delay = permit.record_failure(e.retry_after());
                            if attempt >= max_attempts {
                                return ModelOutcome::Exhausted(e);
                            }
                            metrics::counter!(telemetry::RETRIES_TOTAL,
                                "provider" => self.provider.name().to_owned(),
                                "model" => request.model.clone(),
                            )
                            .increment(1);
                            warn!(
                                model = %request.model,
                                attempt,
                                max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "retrying after transient error"
                            );
                            State::Backoff { attempt, delay }
                        }
                        Err(e) => return ModelOutcome::Fatal(e),
                    }
                }
                State::Backoff { attempt, delay } => {
                    tokio::time::sleep(delay).await;
                    State::Admit {
                        attempt: attempt + 1,
                    }
                }
            };
        }
    }

    /// One network call, bounded by the timeout, normalized to content.
    async fn send(&self, request: &CompletionRequest) -> Result<String> {
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                MimirError::TransientNetwork(format!(
                    "request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;
        if let Some(usage) = response.usage() {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "upstream usage"
            );
        }
        response.normalize()
    }

    /// Quota cost: estimated input tokens plus the requested output.
    fn request_cost(&self, request: &CompletionRequest) -> u64 {
        let input = self.estimator.estimate_tokens(&request.system)
            + self.estimator.estimate_tokens(&request.content);
        (input as u64).saturating_add(u64::from(request.max_output_tokens))
    }

    fn record_request(&self, model: &str, start: Instant, success: bool) {
        let provider = self.provider.name().to_owned();
        let status = if success { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.clone(),
            "model" => model.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider,
            "model" => model.to_owned(),
        )
        .record(start.elapsed().as_secs_f64());
    }
}
