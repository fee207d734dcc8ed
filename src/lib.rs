//! Mimir - resilient long-text analysis over rate-limited LLM APIs
//!
//! This crate sends documents of any length to a remote completion service
//! and hands back one merged JSON answer. Content that would not fit in a
//! single request is split into chunks, every request passes through a
//! shared rate limiter with adaptive backoff, exhausted models fail over
//! to a fallback model, and completed results are cached by content and
//! parameters.
//!
//! # Example
//!
//! ```rust,no_run
//! use mimir::{AnalyzeParams, Mimir, TextAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     let analyzer = Mimir::builder()
//!         .openrouter("sk-or-your-key")
//!         .primary_model("openai/gpt-4o-mini")
//!         .fallback_model("anthropic/claude-3.5-haiku")
//!         .build()?;
//!
//!     let resume = std::fs::read_to_string("resume.txt").unwrap_or_default();
//!     let result = analyzer
//!         .analyze_text(
//!             &resume,
//!             &AnalyzeParams::new(
//!                 "Compare the resume with a senior Rust role. Answer in JSON with \
//!                  score, matchedSkills, missingSkills and feedback.",
//!             ),
//!         )
//!         .await?;
//!
//!     println!("{}", result.value);
//!     Ok(())
//! }
//! ```
//!
//! # From configuration
//!
//! ```rust,no_run
//! use mimir::{Config, Mimir, TextAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> mimir::Result<()> {
//!     // ~/.mimir/config.toml, /etc/mimir/config.toml, then MIMIR_* variables
//!     let config = Config::load(None)?;
//!     let analyzer = Mimir::from_config(&config)?;
//!
//!     let score = analyzer.scalar_score_or("some text", 50.0).await?;
//!     println!("{score}");
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod error;
pub mod merge;
pub mod providers;
pub mod telemetry;
pub mod tokenizer;
pub mod traits;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use analyzer::{Analyzer, DEFAULT_SCORE_INSTRUCTION, Mimir, MimirBuilder};
pub use cache::{CacheConfig, ResponseCache};
pub use chunker::CostBudget;
pub use config::{Config, ProviderConfig, ProviderKind};
pub use error::{MimirError, Result};
pub use providers::{
    CompletionProvider, GeminiClient, OpenAiCompatClient, RateLimitConfig, RateLimiter,
    RetryConfig, UpstreamResponse,
};
pub use tokenizer::{EstimatorConfig, HeuristicEstimator, TokenEstimator};
pub use traits::TextAnalyzer;
pub use version::{PKG_VERSION, version_string};

// Re-export all types
pub use types::{
    AnalysisResult, AnalyzeParams, Chunk, ChunkResult, CompletionRequest, OverflowStrategy,
    RequestTemplate, ResultShape,
};
