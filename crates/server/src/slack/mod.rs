//! Slack surface: signed webhooks in, Web API calls out.

pub mod api;
pub mod events;
pub mod handler;
pub mod signature;

pub use api::{AuthInfo, ChannelResponder, ResponseUrlResponder, SlackApi};
pub use handler::{slack_router, SlackState};
pub use signature::{SignatureError, SignatureVerifier};
