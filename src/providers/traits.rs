//! Provider trait for upstream completion services.
//!
//! A provider translates one [`CompletionRequest`] into its own wire format,
//! sends it, and hands back the raw [`UpstreamResponse`]. It does not retry,
//! throttle, or switch models: those belong to the
//! [`Executor`](super::Executor), which wraps every provider the same way.
//!
//! # Error Semantics
//!
//! Providers classify failures into the crate taxonomy:
//! - `RateLimited` for HTTP 429 (with the `Retry-After` hint when present)
//! - `PayloadTooLarge` for HTTP 413, which the executor never retries
//! - `TransientNetwork` for connection failures and timeouts
//! - `Api` for any other non-success status
//!
//! # Example
//!
//! ```ignore
//! struct Canned;
//!
//! #[async_trait]
//! impl CompletionProvider for Canned {
//!     fn name(&self) -> &str { "canned" }
//!
//!     async fn complete(&self, _request: &CompletionRequest) -> Result<UpstreamResponse> {
//!         Ok(serde_json::from_value(json!({
//!             "choices": [{"message": {"content": "{\"score\": 50}"}}]
//!         }))?)
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use super::envelope::UpstreamResponse;
use crate::Result;
use crate::types::CompletionRequest;

/// Upstream completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging/metrics.
    fn name(&self) -> &str;

    /// Send one completion request.
    async fn complete(&self, request: &CompletionRequest) -> Result<UpstreamResponse>;
}

#[async_trait]
impl<T: CompletionProvider + ?Sized> CompletionProvider for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<UpstreamResponse> {
        (**self).complete(request).await
    }
}
