//! Template matcher — classifies the stated goal into a template category.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::templates::TemplateRegistry;

pub struct TemplateMatcher {
    llm: Arc<dyn LlmProvider>,
    registry: Arc<TemplateRegistry>,
}

impl TemplateMatcher {
    pub fn new(llm: Arc<dyn LlmProvider>, registry: Arc<TemplateRegistry>) -> Self {
        Self { llm, registry }
    }

    /// Classify a free-text goal into one known template name.
    ///
    /// The classifier is asked for exactly one category name; whatever comes
    /// back is matched case-insensitively and anything unrecognized resolves
    /// to the default template.
    pub async fn classify(&self, goal: &str) -> Result<String, LlmError> {
        let prompt = format!(
            "You are a classification expert.\n\n\
             Given this retirement goal:\n\n\
             \"{goal}\"\n\n\
             Choose ONE category based on the following descriptions:\n\n\
             {descriptions}\n\n\
             If the goal does not clearly match any category, respond with: \
             default\n\n\
             Answer with ONLY the category name.",
            descriptions = self.registry.descriptions_block(),
        );
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_max_tokens(16)
            .with_temperature(0.0);
        let response = self.llm.complete(request).await?;

        let answer = response.content.trim().to_lowercase();
        let template = self.registry.resolve(&answer);
        tracing::debug!(goal, category = template.name(), "Goal classified");
        Ok(template.name().to_string())
    }
}
