//! LLM integration crate for Whatsupdoc.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! the hosted generative model that writes grounded answers. Providers plug
//! in behind the [`LlmClient`] trait.
//!
//! # Providers
//! - **Gemini on Vertex AI**: bearer-token authenticated (default)
//! - **Gemini Developer API**: API-key authenticated
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use whatsupdoc_llm::{GeminiClient, LlmClient, LlmRequest, StaticToken};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tokens = Arc::new(StaticToken::new("ya29.token"));
//! let client = GeminiClient::vertex("my-project", "us-central1", tokens);
//! let request = LlmRequest::new("Hello, world!", "gemini-2.5-flash-lite");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use auth::{create_token_provider, AccessTokenProvider, MetadataServerToken, StaticToken};
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::GeminiClient;
pub use types::{LlmConfig, ProviderType};
