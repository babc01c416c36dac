//! Process startup for both surfaces.
//!
//! Startup verifies external services before accepting traffic: the
//! retrieval corpus must be reachable, while a failing generative model only
//! downgrades the process to search-only answers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use whatsupdoc_core::{AppConfig, AppError, AppResult};
use whatsupdoc_llm::{create_client, create_token_provider, AccessTokenProvider, LlmConfig};
use whatsupdoc_prompt::load_prompt;
use whatsupdoc_rag::{
    AnswerGenerator, GeneratorSettings, PipelineSettings, RagPipeline, RateLimiter,
    RetrievalClient, ServiceHealth, VertexRagClient,
};

use crate::slack::{slack_router, SignatureVerifier, SlackApi, SlackState};
use crate::supervisor::TaskSupervisor;
use crate::web::{web_router, WebState};

/// Per-IP limit of the web surface.
pub const WEB_RATE_LIMIT: u32 = 10;
pub const WEB_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Budget for startup and health probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time left for posting the placeholder and the final reply.
const DELIVERY_MARGIN: Duration = Duration::from_secs(30);

/// Everything a surface needs to answer questions.
#[derive(Clone)]
pub struct Services {
    pub pipeline: RagPipeline,
    pub retrieval: ServiceHealth,
    pub generation: ServiceHealth,
}

/// Connect to retrieval and, when enabled, the generative model.
///
/// # Errors
/// Fails on invalid configuration or when the corpus cannot be reached.
pub async fn build_services(config: &AppConfig) -> AppResult<Services> {
    config.validate()?;

    let tokens = create_token_provider(config.auth.access_token.as_deref());
    let retrieval: Arc<dyn RetrievalClient> =
        Arc::new(VertexRagClient::from_config(config, tokens.clone()));

    let retrieval_health = probe_retrieval(retrieval.as_ref()).await;
    match retrieval_health {
        ServiceHealth::Healthy => {
            tracing::info!("Connected to RAG corpus {}", config.rag_corpus_name())
        }
        ServiceHealth::Degraded => tracing::warn!(
            "RAG corpus {} is reachable but retrieval is not fully available",
            config.rag_corpus_name()
        ),
        _ => {
            return Err(AppError::Retrieval(format!(
                "Failed to connect to RAG corpus {}",
                config.rag_corpus_name()
            )))
        }
    }

    let (generator, generation) = if config.generation.enabled {
        match build_generator(config, tokens).await {
            Ok(generator) => {
                tracing::info!("Answer generation enabled with {}", generator.model());
                (Some(Arc::new(generator)), ServiceHealth::Healthy)
            }
            Err(e) => {
                tracing::warn!(
                    "Answer generation unavailable, falling back to search-only mode: {}",
                    e
                );
                (None, ServiceHealth::Unavailable)
            }
        }
    } else {
        tracing::info!("Answer generation disabled, running in search-only mode");
        (None, ServiceHealth::Disabled)
    };

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.per_user,
        config.rate_limit_window(),
    ));
    let pipeline = RagPipeline::new(
        retrieval,
        generator,
        limiter,
        PipelineSettings::from_config(config),
    );

    Ok(Services {
        pipeline,
        retrieval: retrieval_health,
        generation,
    })
}

async fn probe_retrieval(retrieval: &dyn RetrievalClient) -> ServiceHealth {
    tokio::time::timeout(PROBE_TIMEOUT, retrieval.health_check())
        .await
        .unwrap_or(ServiceHealth::Unavailable)
}

async fn build_generator(
    config: &AppConfig,
    tokens: Arc<dyn AccessTokenProvider>,
) -> AppResult<AnswerGenerator> {
    let llm = create_client(&LlmConfig::from_app_config(config), tokens)?;
    let prompt = load_prompt(config.generation.prompt_file.as_deref())?;
    let settings = GeneratorSettings::from_config(config);

    tokio::time::timeout(PROBE_TIMEOUT, llm.health_check(&settings.model))
        .await
        .map_err(|_| AppError::Timeout {
            service: "Generation",
            seconds: PROBE_TIMEOUT.as_secs(),
        })??;

    Ok(AnswerGenerator::new(llm, prompt, settings))
}

/// Longest a background Slack request may run: retrieval and generation,
/// each with its retries, plus the Slack posts around them.
pub fn request_deadline(settings: &PipelineSettings) -> Duration {
    settings.worst_case() + DELIVERY_MARGIN
}

/// Periodically drop rate-limit windows that have elapsed.
pub fn spawn_eviction(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.evict_expired();
        }
    })
}

/// Resolves on ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

async fn bind(port: u16) -> AppResult<tokio::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    Ok(listener)
}

/// Run the Slack webhook server until shutdown.
pub async fn run_slack(config: &AppConfig) -> AppResult<()> {
    let (bot_token, signing_secret) = config.slack_credentials()?;
    let services = build_services(config).await?;

    let api = SlackApi::new(bot_token);
    let identity = api.auth_test().await?;
    tracing::info!(
        "Connected to Slack as {} (team: {})",
        identity.user_id,
        identity.team.as_deref().unwrap_or("unknown")
    );

    let supervisor = TaskSupervisor::new(request_deadline(services.pipeline.settings()));
    let eviction = spawn_eviction(
        services.pipeline.limiter().clone(),
        config.rate_limit_window(),
    );

    let state = SlackState {
        pipeline: services.pipeline,
        api,
        verifier: SignatureVerifier::new(signing_secret),
        supervisor: supervisor.clone(),
        bot_user_id: Some(identity.user_id),
        slash_command: config.slack.slash_command.clone(),
    };

    tracing::info!("{} is ready", config.slack.bot_name);
    let listener = bind(config.web.port).await?;
    let served = axum::serve(listener, slack_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    supervisor.shutdown().await;
    eviction.abort();
    served.map_err(AppError::from)
}

/// Run the web chat API until shutdown.
pub async fn run_web(config: &AppConfig) -> AppResult<()> {
    let services = build_services(config).await?;

    let limiter = Arc::new(RateLimiter::new(WEB_RATE_LIMIT, WEB_RATE_WINDOW));
    let eviction = spawn_eviction(limiter.clone(), WEB_RATE_WINDOW);

    if config.web.allowed_origins.is_empty() {
        tracing::warn!("ALLOWED_ORIGINS is empty; every chat request will be rejected");
    }

    let state = WebState {
        pipeline: services.pipeline.with_limiter(limiter),
        generation: services.generation,
        allowed_origins: Arc::new(config.web.allowed_origins.clone()),
        health_timeout: PROBE_TIMEOUT,
    };
    let router = web_router(state, &config.web.cors_origins);

    let listener = bind(config.web.port).await?;
    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    eviction.abort();
    served.map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_invalid_config_fails_before_network() {
        let config = AppConfig::default();
        let err = build_services(&config).await.err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("PROJECT_ID"));
    }

    #[tokio::test]
    async fn test_slack_requires_credentials() {
        let mut config = AppConfig::default();
        config.gcp.project_id = "p".into();
        config.gcp.rag_corpus_id = "c".into();
        let err = run_slack(&config).await.unwrap_err();
        assert!(err.to_string().contains("SLACK_BOT_TOKEN"));
    }

    #[tokio::test]
    async fn test_eviction_runs_periodically() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_millis(10)));
        assert!(limiter.check_at("U1", Instant::now()));
        assert_eq!(limiter.tracked_users(), 1);

        let handle = spawn_eviction(limiter.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();
        assert_eq!(limiter.tracked_users(), 0);
    }

    #[test]
    fn test_request_deadline_covers_retries() {
        let settings = PipelineSettings::from_config(&AppConfig::default());
        // 3 attempts of 30 s with 1 s and 2 s backoff, for both calls
        assert_eq!(settings.worst_case(), Duration::from_secs(186));
        assert!(request_deadline(&settings) > settings.worst_case());

        let mut slow = AppConfig::default();
        slow.retrieval.response_timeout = 120;
        let slow = PipelineSettings::from_config(&slow);
        assert_eq!(slow.worst_case(), Duration::from_secs(2 * (3 * 120 + 3)));
        assert!(request_deadline(&slow) > slow.worst_case());
    }
}
