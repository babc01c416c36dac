//! Prompt loader for YAML prompt definitions.
//!
//! The grounded-answer prompt ships embedded in the binary; deployments can
//! replace it with their own YAML file via `PROMPT_FILE`.

use crate::types::PromptDefinition;
use std::path::Path;
use whatsupdoc_core::{AppError, AppResult};

const DEFAULT_PROMPT: &str = include_str!("../prompts/rag.answer.yml");

/// Load the answer prompt from `path`, or the built-in one when `None`.
///
/// # Example
/// ```no_run
/// use whatsupdoc_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Some(Path::new("prompts/hr.yml")))?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(path: Option<&Path>) -> AppResult<PromptDefinition> {
    let Some(prompt_file) = path else {
        return default_prompt();
    };

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition = parse_prompt(&contents).map_err(|e| {
        AppError::Prompt(format!("Invalid prompt file {:?}: {}", prompt_file, e))
    })?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// The built-in grounded-answer prompt.
pub fn default_prompt() -> AppResult<PromptDefinition> {
    parse_prompt(DEFAULT_PROMPT)
}

fn parse_prompt(contents: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML: {}", e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    for variable in ["query", "context"] {
        if !def.template.contains(&format!("{{{{{}}}}}", variable)) {
            tracing::warn!(
                "Prompt {} does not reference {{{{{}}}}}",
                def.id,
                variable
            );
        }
    }

    Ok(())
}
