//! Configuration management for Whatsupdoc.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - An optional YAML config file (`--config` or `WHATSUPDOC_CONFIG`)
//! - Environment variables (override the file)
//! - Command-line flags (override everything)
//!
//! Environment lookup is injectable through [`AppConfig::from_lookup`] so
//! tests never have to mutate the process environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Config file this configuration was merged from, if any
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Google Cloud project and corpus
    pub gcp: GcpConfig,

    /// Slack credentials and presentation
    pub slack: SlackConfig,

    /// Retrieval parameters
    pub retrieval: RetrievalConfig,

    /// Answer generation parameters
    pub generation: GenerationConfig,

    /// Per-user rate limiting
    pub rate_limit: RateLimitConfig,

    /// Web chat API
    pub web: WebConfig,

    /// Google API credentials
    pub auth: AuthConfig,

    /// Logging output
    pub logging: LoggingConfig,
}

/// Google Cloud settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    pub project_id: String,
    pub location: String,
    /// Short corpus id or a full `projects/.../ragCorpora/...` name
    pub rag_corpus_id: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: "us-central1".to_string(),
            rag_corpus_id: String::new(),
        }
    }
}

/// Slack settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub bot_token: Option<String>,
    pub signing_secret: Option<String>,
    pub bot_name: String,
    pub slash_command: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            signing_secret: None,
            bot_name: "KnowledgeBot".to_string(),
            slash_command: "/ask".to_string(),
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: u32,
    /// Maximum vector distance admitted; larger is more permissive
    pub distance_threshold: f64,
    /// Budget for each external call, in seconds
    pub response_timeout: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 7,
            distance_threshold: 0.8,
            response_timeout: 30,
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub enabled: bool,
    pub model: String,
    pub use_vertex_ai: bool,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Context budget in characters
    pub max_context_length: usize,
    pub prompt_file: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.5-flash-lite".to_string(),
            use_vertex_ai: true,
            api_key: None,
            temperature: 0.1,
            max_output_tokens: 1500,
            max_context_length: 100_000,
            prompt_file: None,
        }
    }
}

/// Per-user fixed-window rate limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub per_user: u32,
    /// Window length in seconds
    pub window: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_user: 10,
            window: 60,
        }
    }
}

/// Web chat API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
    /// Origins allowed to call `/api/chat`; empty rejects every caller
    pub allowed_origins: Vec<String>,
    /// Origins sent back in CORS headers
    pub cors_origins: Vec<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            allowed_origins: Vec::new(),
            cors_origins: Vec::new(),
        }
    }
}

/// Google API credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static bearer token; the metadata server is used when absent
    pub access_token: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: LogFormat,
    pub no_color: bool,
    pub verbose: bool,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// `config_file` takes precedence over `WHATSUPDOC_CONFIG`.
    ///
    /// # Example
    /// ```no_run
    /// use whatsupdoc_core::config::AppConfig;
    ///
    /// let config = AppConfig::load(None).expect("Failed to load config");
    /// println!("Corpus: {}", config.rag_corpus_name());
    /// ```
    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        Self::from_lookup(config_file, |key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment.
    pub fn from_lookup<F>(config_file: Option<&Path>, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = config_file
            .map(Path::to_path_buf)
            .or_else(|| lookup("WHATSUPDOC_CONFIG").map(PathBuf::from));

        let mut config = match config_path {
            Some(path) => {
                let mut config = Self::from_yaml_file(&path)?;
                config.config_file = Some(path);
                config
            }
            None => Self::default(),
        };

        config.apply_env(&lookup)?;
        Ok(config)
    }

    /// Read a YAML config file. Missing sections keep their defaults.
    fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    fn apply_env<F>(&mut self, lookup: &F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        env.string("PROJECT_ID", &mut self.gcp.project_id);
        env.string("LOCATION", &mut self.gcp.location);
        env.string("RAG_CORPUS_ID", &mut self.gcp.rag_corpus_id);

        env.optional("SLACK_BOT_TOKEN", &mut self.slack.bot_token);
        env.optional("SLACK_SIGNING_SECRET", &mut self.slack.signing_secret);
        env.string("BOT_NAME", &mut self.slack.bot_name);
        env.string("SLASH_COMMAND", &mut self.slack.slash_command);

        env.parsed("MAX_RESULTS", &mut self.retrieval.max_results)?;
        env.parsed("DISTANCE_THRESHOLD", &mut self.retrieval.distance_threshold)?;
        env.parsed("RESPONSE_TIMEOUT", &mut self.retrieval.response_timeout)?;

        env.flag("ENABLE_RAG_GENERATION", &mut self.generation.enabled)?;
        env.string("GEMINI_MODEL", &mut self.generation.model);
        env.flag("USE_VERTEX_AI", &mut self.generation.use_vertex_ai)?;
        env.optional("GEMINI_API_KEY", &mut self.generation.api_key);
        env.parsed("ANSWER_TEMPERATURE", &mut self.generation.temperature)?;
        env.parsed("MAX_OUTPUT_TOKENS", &mut self.generation.max_output_tokens)?;
        env.parsed("MAX_CONTEXT_LENGTH", &mut self.generation.max_context_length)?;
        if let Some(path) = env.get("PROMPT_FILE") {
            self.generation.prompt_file = Some(PathBuf::from(path));
        }

        env.parsed("RATE_LIMIT_PER_USER", &mut self.rate_limit.per_user)?;
        env.parsed("RATE_LIMIT_WINDOW", &mut self.rate_limit.window)?;

        env.parsed("PORT", &mut self.web.port)?;
        env.list("ALLOWED_ORIGINS", &mut self.web.allowed_origins);
        env.list("CORS_ORIGINS", &mut self.web.cors_origins);

        env.optional("GOOGLE_ACCESS_TOKEN", &mut self.auth.access_token);

        env.optional("RUST_LOG", &mut self.logging.level);
        env.parsed("LOG_FORMAT", &mut self.logging.format)?;
        if (env.lookup)("NO_COLOR").is_some() {
            self.logging.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    pub fn with_overrides(
        mut self,
        log_level: Option<String>,
        log_format: Option<LogFormat>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(log_level) = log_level {
            self.logging.level = Some(log_level);
        }

        if let Some(format) = log_format {
            self.logging.format = format;
        }

        if verbose {
            self.logging.verbose = true;
            // Verbose mode implies debug logging
            if self.logging.level.is_none() {
                self.logging.level = Some("debug".to_string());
            }
        }

        if no_color {
            self.logging.no_color = true;
        }

        self
    }

    /// Full corpus resource name, expanding a bare id.
    pub fn rag_corpus_name(&self) -> String {
        let id = self.gcp.rag_corpus_id.trim();
        if id.starts_with("projects/") {
            id.to_string()
        } else {
            format!(
                "projects/{}/locations/{}/ragCorpora/{}",
                self.gcp.project_id, self.gcp.location, id
            )
        }
    }

    /// Budget for each external call.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.response_timeout)
    }

    /// Rate-limit window length.
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window)
    }

    /// Slack bot token and signing secret, required by the Slack surface.
    pub fn slack_credentials(&self) -> AppResult<(String, String)> {
        let token = self.slack.bot_token.clone().filter(|t| !t.is_empty());
        let secret = self.slack.signing_secret.clone().filter(|s| !s.is_empty());
        match (token, secret) {
            (Some(token), Some(secret)) => Ok((token, secret)),
            (token, secret) => {
                let mut missing = Vec::new();
                if token.is_none() {
                    missing.push("SLACK_BOT_TOKEN");
                }
                if secret.is_none() {
                    missing.push("SLACK_SIGNING_SECRET");
                }
                Err(AppError::Config(format!(
                    "Missing Slack configuration: {}",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Validate required fields and ranges.
    ///
    /// Every violation is collected and reported in a single error.
    pub fn validate(&self) -> AppResult<()> {
        let mut problems = Vec::new();

        if self.gcp.project_id.trim().is_empty() {
            problems.push("PROJECT_ID is required".to_string());
        }
        if self.gcp.rag_corpus_id.trim().is_empty() {
            problems.push("RAG_CORPUS_ID is required".to_string());
        }

        check_range(&mut problems, "MAX_RESULTS", self.retrieval.max_results, 1, 20);
        check_range(
            &mut problems,
            "DISTANCE_THRESHOLD",
            self.retrieval.distance_threshold,
            0.0,
            2.0,
        );
        check_range(
            &mut problems,
            "RESPONSE_TIMEOUT",
            self.retrieval.response_timeout,
            5,
            120,
        );
        check_range(
            &mut problems,
            "ANSWER_TEMPERATURE",
            self.generation.temperature,
            0.0,
            2.0,
        );
        check_range(
            &mut problems,
            "MAX_CONTEXT_LENGTH",
            self.generation.max_context_length,
            1_000,
            1_000_000,
        );
        if self.generation.max_output_tokens == 0 {
            problems.push("MAX_OUTPUT_TOKENS must be positive".to_string());
        }
        check_range(
            &mut problems,
            "RATE_LIMIT_PER_USER",
            self.rate_limit.per_user,
            1,
            100,
        );
        check_range(
            &mut problems,
            "RATE_LIMIT_WINDOW",
            self.rate_limit.window,
            30,
            3_600,
        );

        if self.generation.enabled
            && !self.generation.use_vertex_ai
            && self.generation.api_key.as_deref().unwrap_or("").is_empty()
        {
            problems.push("GEMINI_API_KEY is required when USE_VERTEX_AI is false".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(format!(
                "Invalid configuration: {}",
                problems.join("; ")
            )))
        }
    }
}

fn check_range<T>(problems: &mut Vec<String>, name: &str, value: T, min: T, max: T)
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        problems.push(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        ));
    }
}

/// Typed accessors over an environment lookup function.
struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, target: &mut String) {
        if let Some(value) = self.get(key) {
            *target = value;
        }
    }

    fn optional(&self, key: &str, target: &mut Option<String>) {
        if let Some(value) = self.get(key) {
            *target = Some(value);
        }
    }

    fn list(&self, key: &str, target: &mut Vec<String>) {
        if let Some(value) = self.get(key) {
            *target = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    fn parsed<T>(&self, key: &str, target: &mut T) -> AppResult<()>
    where
        T: std::str::FromStr,
    {
        if let Some(value) = self.get(key) {
            *target = value.parse().map_err(|_| {
                AppError::Config(format!("Invalid value for {}: {:?}", key, value))
            })?;
        }
        Ok(())
    }

    fn flag(&self, key: &str, target: &mut bool) -> AppResult<()> {
        if let Some(value) = self.get(key) {
            *target = match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(AppError::Config(format!(
                        "Invalid boolean for {}: {:?}",
                        key, value
                    )))
                }
            };
        }
        Ok(())
    }
}
