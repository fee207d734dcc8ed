//! Token and byte cost estimation.
//!
//! The estimator is an approximation, not a tokenizer: it scales the word
//! count by an empirical tokens-per-word ratio and adds a fixed percentage
//! for structural framing. A character-based floor catches long unbroken
//! runs (URLs, base64, tables without spaces) that the word count would
//! badly under-count.
//!
//! Estimates are deliberately biased upwards. Over-estimating costs an
//! extra chunk now and then; under-estimating gets the request rejected
//! upstream.
//!
//! All functions here are pure and total, and non-decreasing in the length
//! of their input.

use serde::Deserialize;

/// Trait for cost estimators, so an exact tokenizer can be swapped in.
pub trait TokenEstimator: Send + Sync {
    /// Estimated number of model tokens in `text`.
    fn estimate_tokens(&self, text: &str) -> usize;

    /// Estimated serialized size in bytes of a request carrying `text`.
    fn estimate_request_bytes(&self, text: &str) -> usize;
}

/// Tuning constants for [`HeuristicEstimator`].
///
/// None of these is a contract with any particular upstream tokenizer;
/// adjust them if a provider rejects requests the estimator let through.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Tokens per whitespace-delimited word. Default: 0.75.
    pub tokens_per_word: f64,
    /// Characters per token for the long-run floor. Default: 8.0.
    pub chars_per_token: f64,
    /// Fractional overhead for structural framing. Default: 0.20.
    pub overhead_ratio: f64,
    /// Bytes added for JSON envelope, headers and parameters. Default: 512.
    pub request_overhead_bytes: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            tokens_per_word: 0.75,
            chars_per_token: 8.0,
            overhead_ratio: 0.20,
            request_overhead_bytes: 512,
        }
    }
}

impl EstimatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens_per_word(mut self, ratio: f64) -> Self {
        self.tokens_per_word = ratio;
        self
    }

    pub fn chars_per_token(mut self, chars: f64) -> Self {
        self.chars_per_token = chars;
        self
    }

    pub fn overhead_ratio(mut self, ratio: f64) -> Self {
        self.overhead_ratio = ratio;
        self
    }

    pub fn request_overhead_bytes(mut self, bytes: usize) -> Self {
        self.request_overhead_bytes = bytes;
        self
    }
}

/// Word-count estimator with a character floor. See module docs.
#[derive(Debug, Clone, Default)]
pub struct HeuristicEstimator {
    config: EstimatorConfig,
}

impl HeuristicEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let words = text.split_whitespace().count() as f64;
        let chars = text.chars().count() as f64;

        let by_words = words * self.config.tokens_per_word.max(0.0);
        let by_chars = if self.config.chars_per_token > 0.0 {
            chars / self.config.chars_per_token
        } else {
            0.0
        };
        let base = by_words.max(by_chars);
        (base * (1.0 + self.config.overhead_ratio.max(0.0))).ceil() as usize
    }

    fn estimate_request_bytes(&self, text: &str) -> usize {
        text.len() + self.config.request_overhead_bytes
    }
}

/// Estimate tokens with the default heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    HeuristicEstimator::default().estimate_tokens(text)
}

/// Estimate request bytes with the default heuristic.
pub fn estimate_request_bytes(text: &str) -> usize {
    HeuristicEstimator::default().estimate_request_bytes(text)
}
