//! Extraction agent — turns the latest exchange into profile-field updates.

use std::sync::Arc;

use crate::agents::parse_json_object;
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::profile::{CompletionMap, ProfileValues};

const EXTRACTION_FRAME: &str = "\
You will be analyzing the latest exchange between a user and a chatbot about \
retirement planning.";

const TITLE_FRAME: &str =
    "You generate short, clear titles for retirement planning conversations.";

/// What an extraction pass changed.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    /// Every tracked field is now collected.
    pub all_collected: bool,
    /// Tracked fields newly marked collected this pass.
    pub updated_fields: Vec<String>,
    /// Conversation title, generated only when the goal first arrived.
    pub title: Option<String>,
}

pub struct ExtractionAgent {
    llm: Arc<dyn LlmProvider>,
}

impl ExtractionAgent {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Run one structured-extraction pass over the latest exchange.
    ///
    /// The response must be a JSON object keyed by field name. Keys present
    /// in the completion map are marked collected; all returned values are
    /// merged into the profile with last-write-wins semantics. A response
    /// that fails to parse as an object means "no new information" and
    /// changes nothing.
    pub async fn extract(
        &self,
        completion: &mut CompletionMap,
        values: &mut ProfileValues,
        last_assistant: &str,
        last_user: &str,
        generate_title: bool,
    ) -> Result<ExtractionOutcome, LlmError> {
        let messages = vec![
            ChatMessage::system(EXTRACTION_FRAME),
            ChatMessage::system(extraction_instructions(completion)),
            ChatMessage::user(format!(
                "Assistant: {}\nUser: {}",
                last_assistant, last_user
            )),
        ];
        let request = CompletionRequest::new(messages)
            .with_max_tokens(1024)
            .with_temperature(0.0);
        let response = self.llm.complete(request).await?;

        let Some(update) = parse_json_object(&response.content) else {
            tracing::warn!(
                raw = %response.content.chars().take(200).collect::<String>(),
                "Extractor response was not a JSON object, treating as no update"
            );
            return Ok(ExtractionOutcome {
                all_collected: completion.all_collected(),
                ..Default::default()
            });
        };

        let mut updated_fields = Vec::new();
        let goal_was_known = values.contains("goal");
        for (field, value) in update {
            if completion.contains(&field) && completion.mark_collected(&field) {
                updated_fields.push(field.clone());
            }
            values.insert(&field, value);
        }

        // Title generation: once per session, right after the goal arrives.
        let goal_is_new = !goal_was_known && values.contains("goal");
        let title = if generate_title && goal_is_new {
            self.generate_title(values.as_text("goal").unwrap_or_default())
                .await?
        } else {
            None
        };

        Ok(ExtractionOutcome {
            all_collected: completion.all_collected(),
            updated_fields,
            title,
        })
    }

    async fn generate_title(&self, goal: String) -> Result<Option<String>, LlmError> {
        let messages = vec![
            ChatMessage::system(TITLE_FRAME),
            ChatMessage::user(format!(
                "Create a concise, 3-8 word title summarizing this retirement \
                 goal: '{}'.",
                goal
            )),
        ];
        let request = CompletionRequest::new(messages)
            .with_max_tokens(64)
            .with_temperature(0.0);
        let response = self.llm.complete(request).await?;
        let title = response.content.trim().trim_matches('"').to_string();
        Ok((!title.is_empty()).then_some(title))
    }
}

fn extraction_instructions(completion: &CompletionMap) -> String {
    let field_lines = completion
        .fields()
        .map(|(field, entry)| format!("- {} (collected: {})", field, entry.collected))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Below are the data fields being collected and whether each already \
         has a value:\n\
         {field_lines}\n\n\
         Examine the exchange that follows. For every field the user has now \
         provided information for, extract it accurately.\n\
         Respond only with a JSON object containing ONLY the fields you can \
         populate, for example:\n\
         {{\"fieldName1\": fieldValue1, \"fieldName2\": fieldValue2}}\n\
         If no new information is found, return an empty JSON object: {{}}.\n\
         If the user explicitly corrects an already-collected field, include \
         the corrected value.\n\
         Do not include explanations, reasoning, or extra text outside the \
         JSON."
    )
}
