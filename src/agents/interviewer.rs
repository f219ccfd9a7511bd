//! Interview agent — asks for the most important missing profile field.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, Role};
use crate::profile::CompletionMap;

/// Persistent persona instruction. Inserted once at the head of the
/// interviewer's log and never duplicated.
pub(crate) const PERSONA: &str = "\
You are NestWise, a financial planning assistant.
You must ONLY talk about retirement and personal finance.
If the user asks about unrelated topics (e.g., cooking, movies), politely \
redirect back: \"I can't provide recipes, but I can help you estimate your \
retirement savings instead.\"
You will be given the user's current profile status each turn. Decide what \
to ask the user next:
- If the retirement goal is still unknown, prompt the user to share it \
(e.g., early retirement, financial security, travel).
- Otherwise, ask about exactly ONE other field that is still missing.
Return only the next message to send to the user - no explanations and no \
extra text.";

/// Marker identifying the per-turn status message, so stale copies can be
/// filtered out before the next call.
const STATUS_MARKER: &str = "Below is the user's current profile status.";

/// Completion phrase the model is told to use when nothing is missing. If it
/// shows up while fields remain open, the reply is discarded.
const DONE_PHRASE: &str = "all necessary info collected";

pub struct InterviewAgent {
    llm: Arc<dyn LlmProvider>,
}

impl InterviewAgent {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Produce the next question (or completion signal) and append it to the
    /// interviewer's log. Reads the profile, never writes it.
    pub async fn next_message(
        &self,
        log: &mut Vec<ChatMessage>,
        completion: &CompletionMap,
    ) -> Result<String, LlmError> {
        ensure_persona(log);
        log.retain(|m| !(m.role == Role::User && m.content.starts_with(STATUS_MARKER)));

        let missing = completion.missing_by_importance();
        log.push(ChatMessage::user(status_message(completion, &missing)));

        let request = CompletionRequest::new(log.clone()).with_temperature(0.0);
        let response = self.llm.complete(request).await?;
        let mut reply = response.content.trim().to_string();

        // The model occasionally declares completion while fields are still
        // open; substitute the deterministic question for the top missing
        // field instead of trusting it.
        if !missing.is_empty() && reply.to_lowercase().starts_with(DONE_PHRASE) {
            let (field, _) = missing[0];
            tracing::warn!(field, "Model claimed completion early, overriding");
            reply = fallback_question(field);
        }

        log.push(ChatMessage::assistant(&reply));
        Ok(reply)
    }
}

/// Insert the persona instruction at the head of the log, once.
pub(crate) fn ensure_persona(log: &mut Vec<ChatMessage>) {
    let has_persona = log
        .first()
        .is_some_and(|m| m.role == Role::System && m.content.contains("NestWise"));
    if !has_persona {
        log.insert(0, ChatMessage::system(PERSONA));
    }
}

fn status_message(completion: &CompletionMap, missing: &[(&str, u8)]) -> String {
    let status_lines = completion
        .fields()
        .map(|(field, entry)| {
            format!(
                "- {} (importance: {}, collected: {})",
                field, entry.importance, entry.collected
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let missing_lines = if missing.is_empty() {
        "None".to_string()
    } else {
        missing
            .iter()
            .map(|(field, importance)| format!("- {} (importance: {})", field, importance))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "{STATUS_MARKER}\n\
         Each field has an importance score (5 = most important):\n\n\
         {status_lines}\n\n\
         Missing fields sorted by importance:\n\
         {missing_lines}\n\n\
         Your task:\n\
         1. If fields are missing: ask about the MOST important missing field \
         in a conversational way.\n\
         2. If all collected: respond with \"All necessary info collected. \
         Proceeding to generate your plan.\""
    )
}

/// Deterministic question substituted when the model's reply is discarded.
fn fallback_question(field: &str) -> String {
    format!("Could you please provide your {}?", field.replace('_', " "))
}
