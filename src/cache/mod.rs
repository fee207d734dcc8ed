//! Caching subsystem.
//!
//! [`ResponseCache`] memoizes completed analyses so that identical
//! `(content, parameters)` within the TTL window never reach the network.
//! It is the first thing [`Analyzer`](crate::Analyzer) consults and has no
//! dependencies on the rest of the crate.

pub mod response;

pub use response::{CacheConfig, ResponseCache, cache_key};
