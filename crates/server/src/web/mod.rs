//! HTTP chat API for the embeddable web widget.

pub mod chat;
pub mod health;
pub mod origin;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use whatsupdoc_rag::{RagPipeline, ServiceHealth};

pub use chat::{ChatRequest, ChatResponse};
pub use health::HealthResponse;

pub const PROCESS_TIME_HEADER: &str = "x-process-time";
const WIDGET_URL_HEADER: &str = "x-widget-url";

/// Shared state of the web surface.
#[derive(Clone)]
pub struct WebState {
    pub pipeline: RagPipeline,
    /// Generation status recorded at startup
    pub generation: ServiceHealth,
    pub allowed_origins: Arc<Vec<String>>,
    pub health_timeout: Duration,
}

/// Error body for every non-2xx API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_code: error_code.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(WIDGET_URL_HEADER)])
        .expose_headers([HeaderName::from_static(PROCESS_TIME_HEADER)]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

async fn process_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = format!("{:.4}", started.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

/// Build the web router. CORS origins fall back to the allowlist when
/// none are configured.
pub fn web_router(state: WebState, cors_origins: &[String]) -> Router {
    let cors_origins = if cors_origins.is_empty() {
        state.allowed_origins.as_slice()
    } else {
        cors_origins
    };
    let cors = cors_layer(cors_origins);

    Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/health", get(health::health))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            origin::validate_origin,
        ))
        .layer(middleware::from_fn(process_time))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
