//! Builder for configuring analyzer instances

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::Analyzer;
use crate::cache::{CacheConfig, ResponseCache};
use crate::chunker::CostBudget;
use crate::config::{Config, ProviderKind};
use crate::providers::openai::{OPENAI_BASE_URL, OPENROUTER_BASE_URL};
use crate::providers::gemini::GEMINI_BASE_URL;
use crate::providers::{
    CompletionProvider, DEFAULT_REQUEST_TIMEOUT, Executor, GeminiClient, ModelRoute,
    OpenAiCompatClient, RateLimitConfig, RateLimiter, RetryConfig,
};
use crate::tokenizer::{EstimatorConfig, HeuristicEstimator, TokenEstimator};
use crate::{MimirError, Result};

/// System instruction used by `scalar_score` unless overridden.
pub const DEFAULT_SCORE_INSTRUCTION: &str = "Rate the following content on a scale from 0 to 100. \
Respond with a JSON object of the form {\"score\": <integer>} and nothing else.";

/// Main entry point for creating analyzer instances.
pub struct Mimir;

impl Mimir {
    /// Create a new builder for configuring the analyzer.
    pub fn builder() -> MimirBuilder {
        MimirBuilder::new()
    }

    /// Build an analyzer from loaded configuration.
    ///
    /// Fails with `Configuration` when no API key was configured.
    pub fn from_config(config: &Config) -> Result<Analyzer> {
        let provider = &config.provider;
        let api_key = provider.api_key.clone().ok_or_else(|| {
            MimirError::Configuration(format!(
                "missing API key: set MIMIR_API_KEY or {}",
                provider.kind.api_key_env()
            ))
        })?;

        let mut builder = Mimir::builder()
            .api_key(provider.kind, api_key)
            .primary_model(provider.primary_model())
            .timeout(provider.timeout)
            .budget(config.budget.clone())
            .estimator_config(config.estimator.clone())
            .rate_limit(config.rate_limit.clone())
            .retry(config.retry.clone())
            .cache(config.effective_cache());
        if let Some(url) = &provider.base_url {
            builder = builder.base_url(url.as_str());
        }
        if let Some(model) = &provider.fallback_model {
            builder = builder.fallback_model(model.as_str());
        }
        builder.build()
    }
}

enum ProviderChoice {
    Keyed(ProviderKind, String),
    Custom(Arc<dyn CompletionProvider>),
}

/// Builder for configuring analyzer instances.
pub struct MimirBuilder {
    provider: Option<ProviderChoice>,
    base_url: Option<String>,
    primary_model: Option<String>,
    fallback_model: Option<String>,
    timeout: Duration,
    budget: CostBudget,
    estimator: Option<Arc<dyn TokenEstimator>>,
    rate_limit: RateLimitConfig,
    retry: RetryConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    cache: CacheConfig,
    score_instruction: Option<String>,
}

impl MimirBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            base_url: None,
            primary_model: None,
            fallback_model: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            budget: CostBudget::default(),
            estimator: None,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            rate_limiter: None,
            cache: CacheConfig::default(),
            score_instruction: None,
        }
    }

    /// Use OpenRouter (OpenAI-compatible, routes to many models).
    pub fn openrouter(self, api_key: impl Into<String>) -> Self {
        self.api_key(ProviderKind::OpenRouter, api_key)
    }

    /// Use OpenAI directly.
    pub fn openai(self, api_key: impl Into<String>) -> Self {
        self.api_key(ProviderKind::OpenAi, api_key)
    }

    /// Use Google Gemini.
    pub fn gemini(self, api_key: impl Into<String>) -> Self {
        self.api_key(ProviderKind::Gemini, api_key)
    }

    /// Use a built-in provider chosen at runtime.
    pub fn api_key(mut self, kind: ProviderKind, api_key: impl Into<String>) -> Self {
        self.provider = Some(ProviderChoice::Keyed(kind, api_key.into()));
        self
    }

    /// Use a custom provider. A primary model must then be set explicitly.
    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(ProviderChoice::Custom(provider));
        self
    }

    /// Override the built-in provider's endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn primary_model(mut self, model: impl Into<String>) -> Self {
        self.primary_model = Some(model.into());
        self
    }

    /// Model tried after the primary's attempts are exhausted.
    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = Some(model.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn budget(mut self, budget: CostBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Tune the built-in heuristic estimator.
    pub fn estimator_config(mut self, config: EstimatorConfig) -> Self {
        self.estimator = Some(Arc::new(HeuristicEstimator::new(config)));
        self
    }

    /// Replace the estimator entirely (e.g. an exact tokenizer).
    pub fn estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Share an existing limiter, for analyzers that use the same
    /// credential. Overrides [`rate_limit`](Self::rate_limit) and
    /// [`retry`](Self::retry).
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// System instruction for `scalar_score`.
    pub fn score_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.score_instruction = Some(instruction.into());
        self
    }

    /// Build the analyzer.
    pub fn build(self) -> Result<Analyzer> {
        let (provider, default_model): (Arc<dyn CompletionProvider>, Option<&str>) =
            match self.provider {
                None => {
                    return Err(MimirError::Configuration(
                        "no provider configured: set an API key or a custom provider".into(),
                    ));
                }
                Some(ProviderChoice::Custom(provider)) => (provider, None),
                Some(ProviderChoice::Keyed(kind, key)) => {
                    let base_url = self.base_url.as_deref();
                    let client: Arc<dyn CompletionProvider> = match kind {
                        ProviderKind::OpenRouter => Arc::new(OpenAiCompatClient::with_base_url(
                            "openrouter",
                            key,
                            base_url.unwrap_or(OPENROUTER_BASE_URL),
                            self.timeout,
                        )?),
                        ProviderKind::OpenAi => Arc::new(OpenAiCompatClient::with_base_url(
                            "openai",
                            key,
                            base_url.unwrap_or(OPENAI_BASE_URL),
                            self.timeout,
                        )?),
                        ProviderKind::Gemini => Arc::new(GeminiClient::with_base_url(
                            key,
                            base_url.unwrap_or(GEMINI_BASE_URL),
                            self.timeout,
                        )?),
                    };
                    (client, Some(kind.default_model()))
                }
            };

        let primary = self
            .primary_model
            .or_else(|| default_model.map(str::to_string))
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| MimirError::Configuration("no primary model configured".into()))?;
        let mut route = ModelRoute::new(primary);
        if let Some(fallback) = self.fallback_model.filter(|m| !m.trim().is_empty())
            && fallback != route.primary
        {
            route = route.with_fallback(fallback);
        }

        let estimator = self
            .estimator
            .unwrap_or_else(|| Arc::new(HeuristicEstimator::default()));
        let limiter = self
            .rate_limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.rate_limit, self.retry)));

        debug!(
            provider = provider.name(),
            primary = %route.primary,
            fallback = ?route.fallback,
            "building analyzer"
        );

        let executor = Executor::new(provider, limiter.clone(), route)
            .estimator(estimator.clone())
            .budget(self.budget.clone())
            .timeout(self.timeout);

        Ok(Analyzer::new(
            executor,
            limiter,
            estimator,
            self.budget,
            ResponseCache::new(&self.cache),
            self.score_instruction
                .unwrap_or_else(|| DEFAULT_SCORE_INSTRUCTION.to_string()),
        ))
    }
}

impl Default for MimirBuilder {
    fn default() -> Self {
        Self::new()
    }
}
