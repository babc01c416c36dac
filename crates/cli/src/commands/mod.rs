//! Command handlers for the whatsupdoc CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod check;
pub mod serve;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use check::CheckCommand;
pub use serve::{SlackCommand, WebCommand};
