//! Whatsupdoc Core Library
//!
//! This crate provides the foundational utilities shared by the bot, the web
//! API and the admin console:
//! - Error handling (`AppError`, `AppResult`, `ErrorKind`)
//! - Logging infrastructure
//! - Configuration management
//! - Bounded retry with exponential backoff

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, ErrorKind};
pub use retry::{retry_with_backoff, RetryPolicy};
