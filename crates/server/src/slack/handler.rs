//! Slack webhook endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use whatsupdoc_rag::format::{loading_message, too_short_message};
use whatsupdoc_rag::normalize::{is_too_short, normalize};
use whatsupdoc_rag::{QueryRequest, RagPipeline};

use super::api::{ChannelResponder, ResponseUrlResponder, SlackApi};
use super::events::{EventEnvelope, SlashCommand};
use super::signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::supervisor::TaskSupervisor;

const RETRY_HEADER: &str = "x-slack-retry-num";

/// Shared state of the Slack surface.
#[derive(Clone)]
pub struct SlackState {
    pub pipeline: RagPipeline,
    pub api: SlackApi,
    pub verifier: SignatureVerifier,
    pub supervisor: TaskSupervisor,
    /// The bot's own user id, from `auth.test`
    pub bot_user_id: Option<String>,
    pub slash_command: String,
}

pub fn slack_router(state: SlackState) -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/slack/events", post(events))
        .route("/slack/commands", post(commands))
        .with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn verify(state: &SlackState, headers: &HeaderMap, body: &[u8]) -> Result<(), Response> {
    state
        .verifier
        .verify(
            header(headers, TIMESTAMP_HEADER),
            header(headers, SIGNATURE_HEADER),
            body,
        )
        .map_err(|e| {
            tracing::warn!("Rejected Slack request: {}", e);
            (StatusCode::UNAUTHORIZED, "invalid signature").into_response()
        })
}

async fn events(State(state): State<SlackState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(rejection) = verify(&state, &headers, &body) {
        return rejection;
    }

    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Malformed Slack event payload: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        EventEnvelope::EventCallback { event, event_id } => {
            if let Some(retry) = header(&headers, RETRY_HEADER) {
                tracing::debug!("Ignoring Slack retry #{} of event {:?}", retry, event_id);
                return StatusCode::OK.into_response();
            }

            let Some(question) = event.question(state.bot_user_id.as_deref()) else {
                return StatusCode::OK.into_response();
            };

            tracing::info!(
                user_id = %question.user,
                channel = %question.channel,
                "Received {} event",
                event.kind
            );

            let pipeline = state.pipeline.clone();
            let responder =
                ChannelResponder::new(state.api.clone(), question.channel, question.thread_ts);
            let request = QueryRequest::new(question.user, question.text);
            state.supervisor.spawn("slack event", async move {
                pipeline.handle(request, Some(&responder)).await;
            });

            StatusCode::OK.into_response()
        }
        EventEnvelope::Other => StatusCode::OK.into_response(),
    }
}

async fn commands(State(state): State<SlackState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(rejection) = verify(&state, &headers, &body) {
        return rejection;
    }

    let command = match SlashCommand::from_form(&body) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!("{}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    if command.command != state.slash_command {
        tracing::warn!(
            "Unexpected slash command {} (configured: {})",
            command.command,
            state.slash_command
        );
    }

    tracing::info!(user_id = %command.user_id, channel = %command.channel_id, "Received slash command");

    let query = normalize(&command.text);
    if is_too_short(&query) {
        return ephemeral(too_short_message());
    }

    let pipeline = state.pipeline.clone();
    let responder = ResponseUrlResponder::new(state.api.clone(), command.response_url);
    let request = QueryRequest::new(command.user_id, command.text);
    state.supervisor.spawn("slash command", async move {
        pipeline.handle(request, Some(&responder)).await;
    });

    ephemeral(loading_message(&query))
}

fn ephemeral(text: String) -> Response {
    Json(json!({ "response_type": "ephemeral", "text": text })).into_response()
}
