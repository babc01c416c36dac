//! Retrieval-augmented answering for the document assistant.
//!
//! The crate holds everything between a raw user message and a formatted
//! reply: query normalization, per-user rate limiting, retrieval against
//! the Vertex AI RAG corpus, grounded answer generation, and rendering for
//! Slack and the web API.

pub mod format;
pub mod generator;
pub mod health;
pub mod normalize;
pub mod pipeline;
pub mod rate_limit;
pub mod retrieval;
pub mod types;

#[cfg(test)]
mod tests;

pub use generator::{AnswerGenerator, GeneratorSettings};
pub use health::{HealthReport, ServiceHealth};
pub use pipeline::{
    MessageHandle, PipelineOutcome, PipelineSettings, QueryRequest, RagPipeline, Responder,
};
pub use rate_limit::RateLimiter;
pub use retrieval::{distance_from_confidence, RetrievalClient, VertexRagClient};
pub use types::{RagResponse, SearchResult};
