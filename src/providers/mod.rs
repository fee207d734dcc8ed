//! Upstream completion providers and the resilient executor in front of them.
//!
//! Two wire formats are supported: OpenAI-compatible `chat/completions`
//! (OpenAI, OpenRouter) and Gemini `generateContent`. Both normalize to
//! the same content string through [`UpstreamResponse`]. Every request goes
//! through the [`Executor`], which applies the shared [`RateLimiter`],
//! retries with backoff and fails over to the fallback model.

pub mod envelope;
pub mod executor;
pub mod gemini;
mod http;
pub mod openai;
pub mod rate_limit;
pub mod retry;
pub mod traits;

pub use envelope::{TokenUsage, UpstreamResponse};
pub use executor::{Executor, ModelRoute};
pub use gemini::GeminiClient;
pub use http::DEFAULT_REQUEST_TIMEOUT;
pub use openai::OpenAiCompatClient;
pub use rate_limit::{Permit, RateLimitConfig, RateLimitWindow, RateLimiter};
pub use retry::RetryConfig;
pub use traits::CompletionProvider;
