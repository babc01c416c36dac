//! `POST /api/chat`.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use whatsupdoc_rag::format::{too_short_message, WebAnswer};
use whatsupdoc_rag::{distance_from_confidence, PipelineOutcome, QueryRequest};

use super::{ErrorResponse, WebState};

pub const MAX_QUERY_CHARS: usize = 5000;
pub const MAX_RESULTS_LIMIT: u32 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
    /// Minimum similarity in [0, 1]
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

impl ChatRequest {
    /// Field constraints; returns every violation found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();
        let length = self.query.chars().count();
        if length == 0 || length > MAX_QUERY_CHARS {
            problems.push(format!(
                "query must be between 1 and {} characters",
                MAX_QUERY_CHARS
            ));
        }
        if let Some(n) = self.max_results {
            if !(1..=MAX_RESULTS_LIMIT).contains(&n) {
                problems.push(format!(
                    "max_results must be between 1 and {}",
                    MAX_RESULTS_LIMIT
                ));
            }
        }
        if let Some(t) = self.confidence_threshold {
            if !(0.0..=1.0).contains(&t) {
                problems.push("confidence_threshold must be between 0 and 1".to_string());
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<String>,
    pub conversation_id: String,
    pub response_time_ms: u64,
}

/// Caller address: first `X-Forwarded-For` hop, else the socket peer.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn error(status: StatusCode, response: ErrorResponse) -> Response {
    (status, Json(response)).into_response()
}

pub async fn chat(
    State(state): State<WebState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) if e.is_syntax() || e.is_eof() => {
            return error(
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("Request body is not valid JSON", "INVALID_JSON")
                    .with_request_id(&request_id),
            );
        }
        Err(e) => {
            return error(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new(format!("Invalid request: {}", e), "VALIDATION_ERROR")
                    .with_request_id(&request_id),
            );
        }
    };

    if let Err(problems) = request.validate() {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorResponse::new(problems.join("; "), "VALIDATION_ERROR").with_request_id(&request_id),
        );
    }

    let conversation_id = request
        .conversation_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let ip = client_ip(&headers, &extensions);

    tracing::info!(
        request_id = %request_id,
        conversation_id = %conversation_id,
        query_length = request.query.chars().count(),
        "Processing chat request"
    );

    let mut query = QueryRequest::new(ip, request.query).with_request_id(&request_id);
    if let Some(n) = request.max_results {
        query = query.with_max_results(n);
    }
    if let Some(threshold) = request.confidence_threshold {
        query = query.with_distance_threshold(distance_from_confidence(threshold));
    }

    let answer = match state.pipeline.handle(query, None).await {
        PipelineOutcome::Answered { response, .. } => WebAnswer::from_response(&response),
        PipelineOutcome::SearchOnly { results, .. } => WebAnswer::from_search_results(&results),
        PipelineOutcome::NoResults { .. } => WebAnswer::no_results(),
        PipelineOutcome::TooShort => WebAnswer {
            answer: too_short_message(),
            confidence: 0.0,
            sources: Vec::new(),
        },
        PipelineOutcome::RateLimited { limit, window } => {
            return error(
                StatusCode::TOO_MANY_REQUESTS,
                ErrorResponse::new(
                    format!("Rate limit exceeded: {} per {} seconds", limit, window.as_secs()),
                    "RATE_LIMITED",
                )
                .with_request_id(&request_id),
            );
        }
        PipelineOutcome::Failed { error: e, .. } => {
            tracing::error!(request_id = %request_id, "Error processing chat request: {}", e);
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("Failed to process query", "PROCESSING_ERROR")
                    .with_request_id(&request_id),
            );
        }
    };

    let response_time_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        request_id = %request_id,
        response_time_ms,
        confidence = answer.confidence,
        "Chat request processed"
    );

    Json(ChatResponse {
        answer: answer.answer,
        confidence: answer.confidence,
        sources: answer.sources,
        conversation_id,
        response_time_ms,
    })
    .into_response()
}
