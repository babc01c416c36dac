//! Whatsupdoc servers.
//!
//! Two HTTP surfaces over one RAG pipeline:
//! - the Slack webhook receiver (events and slash commands)
//! - the JSON chat API used by the embeddable web widget
//!
//! [`bootstrap`] wires configuration into either one.

pub mod bootstrap;
pub mod slack;
pub mod supervisor;
pub mod web;

pub use bootstrap::{build_services, run_slack, run_web, Services};
pub use supervisor::TaskSupervisor;
pub use web::{web_router, ErrorResponse, WebState};
