//! Check command handler.

use clap::Args;
use std::time::Duration;
use whatsupdoc_core::{config::AppConfig, AppError, AppResult};
use whatsupdoc_llm::{create_client, create_token_provider, LlmConfig};
use whatsupdoc_rag::{HealthReport, VertexRagClient};

/// Check connectivity to retrieval and generation
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Seconds to wait for each service
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing check command");
        config.validate()?;

        let tokens = create_token_provider(config.auth.access_token.as_deref());
        let retrieval = VertexRagClient::from_config(config, tokens.clone());
        let llm = if config.generation.enabled {
            Some(create_client(&LlmConfig::from_app_config(config), tokens)?)
        } else {
            None
        };

        let report = HealthReport::probe(
            &retrieval,
            llm.as_deref().map(|llm| (llm, config.generation.model.as_str())),
            Duration::from_secs(self.timeout),
        )
        .await;

        if self.json {
            let output = serde_json::json!({
                "status": report.overall(),
                "corpus": config.rag_corpus_name(),
                "model": config.generation.model,
                "dependencies": report,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Corpus:     {}", config.rag_corpus_name());
            println!("Retrieval:  {:?}", report.retrieval);
            println!("Generation: {:?} ({})", report.generation, config.generation.model);
            println!("Overall:    {:?}", report.overall());
        }

        if report.retrieval.is_connected() {
            Ok(())
        } else {
            Err(AppError::Retrieval(format!(
                "Retrieval service unavailable for corpus {}",
                config.rag_corpus_name()
            )))
        }
    }
}
