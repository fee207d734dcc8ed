//! Public types for the Mimir API.

mod chunk;
mod options;
mod request;
mod response;

pub use chunk::{Chunk, ChunkResult};
pub use options::{AnalyzeParams, OverflowStrategy};
pub use request::{CompletionRequest, DEFAULT_TEMPERATURE, RequestTemplate};
pub use response::{AnalysisResult, ResultShape};
