//! Ask command handler.
//!
//! Runs one question through the same pipeline the servers use and prints
//! the reply to stdout, for trying out a deployment without Slack.

use clap::Args;
use serde_json::{json, Value};
use whatsupdoc_core::{config::AppConfig, AppResult};
use whatsupdoc_rag::format::SlackMessage;
use whatsupdoc_rag::{MessageHandle, PipelineOutcome, QueryRequest, Responder};
use whatsupdoc_server::build_services;

/// Ask one question through the full pipeline
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// User id the request is attributed to (for rate limiting)
    #[arg(long, default_value = "console")]
    pub user: String,

    /// Ask the same question this many times
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Maximum results to retrieve
    #[arg(long)]
    pub max_results: Option<u32>,

    /// Skip answer generation and list the retrieved excerpts
    #[arg(long)]
    pub no_generation: bool,

    /// Print the Slack blocks as JSON
    #[arg(long, conflicts_with = "json")]
    pub blocks: bool,

    /// Print the answer bundle as JSON
    #[arg(long)]
    pub json: bool,
}

/// Prints replies instead of posting them.
struct ConsoleResponder {
    blocks: bool,
}

#[async_trait::async_trait]
impl Responder for ConsoleResponder {
    async fn send(&self, message: &SlackMessage) -> AppResult<Option<MessageHandle>> {
        if self.blocks {
            println!("{}", serde_json::to_string_pretty(message)?);
        } else {
            println!("{}", message.plain_text());
        }
        Ok(None)
    }

    async fn update(&self, _handle: &MessageHandle, message: &SlackMessage) -> AppResult<()> {
        self.send(message).await.map(|_| ())
    }
}

fn outcome_name(outcome: &PipelineOutcome) -> &'static str {
    match outcome {
        PipelineOutcome::TooShort => "too_short",
        PipelineOutcome::RateLimited { .. } => "rate_limited",
        PipelineOutcome::NoResults { .. } => "no_results",
        PipelineOutcome::Answered { .. } => "answered",
        PipelineOutcome::SearchOnly { .. } => "search_only",
        PipelineOutcome::Failed { .. } => "failed",
    }
}

/// JSON rendering of an outcome.
fn bundle(outcome: &PipelineOutcome) -> AppResult<Value> {
    let mut value = json!({
        "outcome": outcome_name(outcome),
        "reply": outcome.to_slack_message().text,
    });
    match outcome {
        PipelineOutcome::Answered { response, .. } => {
            value["response"] = serde_json::to_value(response)?;
        }
        PipelineOutcome::SearchOnly { results, .. } => {
            value["results"] = serde_json::to_value(results)?;
        }
        PipelineOutcome::Failed { error, .. } => {
            value["error"] = json!(error.to_string());
        }
        _ => {}
    }
    Ok(value)
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mut config = config.clone();
        if self.no_generation {
            config.generation.enabled = false;
        }
        let services = build_services(&config).await?;
        let responder = ConsoleResponder {
            blocks: self.blocks,
        };

        let mut failure = None;
        for _ in 0..self.repeat.max(1) {
            let mut request = QueryRequest::new(&self.user, &self.question);
            if let Some(n) = self.max_results {
                request = request.with_max_results(n);
            }

            let outcome = if self.json {
                let outcome = services.pipeline.handle(request, None).await;
                println!("{}", serde_json::to_string_pretty(&bundle(&outcome)?)?);
                outcome
            } else {
                services.pipeline.handle(request, Some(&responder)).await
            };

            if let PipelineOutcome::Failed { error, .. } = outcome {
                failure = Some(error);
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
