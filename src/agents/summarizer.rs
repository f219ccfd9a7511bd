//! Summarizer — compacts a long interview history into a running summary.

use std::sync::Arc;

use crate::agents::interviewer;
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, Role};

const SUMMARY_FRAME: &str = "\
You are a helpful assistant that summarizes conversations about retirement \
planning. Summarize the following conversation and the extracted user \
profile information. Present the summary clearly and concisely. Do not \
specify next steps.";

pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Produce a new running summary from the prior one plus the full
    /// interview log.
    pub async fn summarize(
        &self,
        prior_summary: Option<&str>,
        log: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let mut messages = vec![
            ChatMessage::system(SUMMARY_FRAME),
            ChatMessage::user(format!(
                "Last summary: {}",
                prior_summary.unwrap_or("None")
            )),
        ];
        messages.extend(log.iter().cloned());

        let request = CompletionRequest::new(messages).with_temperature(0.0);
        let response = self.llm.complete(request).await?;
        Ok(response.content.trim().to_string())
    }
}

/// Reset an interview log after summarization: persona instruction, the new
/// summary, and the single most recent assistant message. Everything else
/// is dropped, bounding context growth while preserving continuity.
pub fn compact_log(log: &mut Vec<ChatMessage>, summary: &str) {
    let last_assistant = log
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .cloned();

    log.clear();
    log.push(ChatMessage::system(interviewer::PERSONA));
    log.push(ChatMessage::user(format!("Summary: {summary}")));
    if let Some(message) = last_assistant {
        log.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::{CompletionResponse, ToolCompletionRequest, ToolCompletionResponse};

    struct RecordingProvider {
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn model_name(&self) -> &str {
            "recording"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: "The user wants to retire at 60 and travel.".into(),
            })
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            unreachable!("summarizer never calls tools")
        }
    }

    #[tokio::test]
    async fn prior_summary_defaults_to_none() {
        let provider = Arc::new(RecordingProvider {
            seen: Mutex::new(Vec::new()),
        });
        let summarizer = Summarizer::new(provider.clone());

        let log = vec![ChatMessage::user("hello")];
        let summary = summarizer.summarize(None, &log).await.unwrap();
        assert!(!summary.is_empty());

        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].messages[1].content.contains("Last summary: None"));
        assert_eq!(seen[0].messages.len(), 3);
    }

    #[tokio::test]
    async fn prior_summary_carried_forward() {
        let provider = Arc::new(RecordingProvider {
            seen: Mutex::new(Vec::new()),
        });
        let summarizer = Summarizer::new(provider.clone());

        summarizer
            .summarize(Some("earlier recap"), &[])
            .await
            .unwrap();
        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].messages[1].content.contains("earlier recap"));
    }

    #[test]
    fn compact_log_keeps_persona_summary_and_last_reply() {
        let mut log = vec![
            ChatMessage::system(interviewer::PERSONA),
            ChatMessage::user("u1"),
            ChatMessage::assistant("a1"),
            ChatMessage::user("u2"),
            ChatMessage::assistant("a2"),
            ChatMessage::user("u3"),
        ];
        compact_log(&mut log, "recap");

        assert_eq!(log.len(), 3);
        assert_eq!(log[0].role, Role::System);
        assert_eq!(log[1].content, "Summary: recap");
        assert_eq!(log[2].content, "a2");
    }

    #[test]
    fn compact_log_without_assistant_messages() {
        let mut log = vec![ChatMessage::user("only user")];
        compact_log(&mut log, "recap");
        assert_eq!(log.len(), 2);
    }
}
