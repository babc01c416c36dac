//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use std::collections::HashMap;
use whatsupdoc_core::{AppError, AppResult};

/// Build a prompt from a definition and input variables.
///
/// Renders the system instruction (if any) and the user template with
/// Handlebars. HTML escaping is disabled; retrieved document text is passed
/// through verbatim.
///
/// # Example
/// ```no_run
/// use whatsupdoc_prompt::{build_prompt, default_prompt};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("query".to_string(), "What is our PTO policy?".to_string());
/// vars.insert("context".to_string(), "Source 1 ...".to_string());
///
/// let built = build_prompt(&default_prompt()?, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let user = render_template(&definition.template, &variables)?;
    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &variables))
        .transpose()?
        .filter(|s| !s.trim().is_empty());

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        variables,
    ))
}

/// Build the grounded-answer prompt for a query and its assembled context.
pub fn build_answer_prompt(
    definition: &PromptDefinition,
    query: &str,
    context: &str,
    source_count: usize,
) -> AppResult<BuiltPrompt> {
    let mut variables = HashMap::new();
    variables.insert("query".to_string(), query.to_string());
    variables.insert("context".to_string(), context.to_string());
    variables.insert("source_count".to_string(), source_count.to_string());
    build_prompt(definition, variables)
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Disable HTML escaping for plain text
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptBehavior, PromptOutputSpec};

    fn create_test_definition(system: Option<&str>) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            behavior: PromptBehavior {
                tone: "professional".to_string(),
                style: "concise".to_string(),
            },
            system: system.map(str::to_string),
            template: "Q: {{query}}\n{{context}}".to_string(),
            output: PromptOutputSpec {
                format: "markdown".to_string(),
            },
        }
    }

    #[test]
    fn test_render_does_not_escape() {
        let mut vars = HashMap::new();
        vars.insert("query".to_string(), "<b>&\"quotes\"".to_string());

        let result = render_template("{{query}}", &vars).unwrap();
        assert_eq!(result, "<b>&\"quotes\"");
    }

    #[test]
    fn test_build_answer_prompt() {
        let def = create_test_definition(Some("Use {{source_count}} sources."));
        let built = build_answer_prompt(&def, "PTO?", "Source 1: ...", 2).unwrap();

        assert_eq!(built.user, "Q: PTO?\nSource 1: ...");
        assert_eq!(built.system.as_deref(), Some("Use 2 sources."));
        assert_eq!(built.metadata.source_prompt_id, "test.prompt");
        assert_eq!(
            built.metadata.resolved_variables.get("source_count"),
            Some(&"2".to_string())
        );
    }

    #[test]
    fn test_build_without_system() {
        let def = create_test_definition(None);
        let built = build_answer_prompt(&def, "q", "c", 1).unwrap();
        assert!(built.system.is_none());
    }

    #[test]
    fn test_invalid_template_is_prompt_error() {
        let vars = HashMap::new();
        let err = render_template("{{#if}}", &vars).unwrap_err();
        assert!(matches!(err, AppError::Prompt(_)));
    }

    #[test]
    fn test_render_template_missing_variable() {
        let vars = HashMap::new();
        // Handlebars renders missing variables as empty string
        assert_eq!(render_template("Q: {{missing}}", &vars).unwrap(), "Q: ");
    }
}
