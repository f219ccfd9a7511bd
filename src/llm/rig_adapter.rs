//! Adapters bridging rig-core models to the crate's provider traits.

use async_trait::async_trait;

use rig::completion::{AssistantContent, CompletionModel};
use rig::embeddings::EmbeddingModel;
use rig::message::Message as RigMessage;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, Embedder, LlmProvider, Role, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};

/// Bridges rig's `CompletionModel` trait to our `LlmProvider` trait.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

/// Split a conversation log into a rig preamble + chat history + final prompt.
///
/// System messages are concatenated into the preamble; tool messages have no
/// first-class rig role in this transport and travel as user messages.
fn to_rig_parts(messages: &[ChatMessage]) -> (Option<String>, Vec<RigMessage>, RigMessage) {
    let mut preamble_parts = Vec::new();
    let mut history = Vec::new();

    for message in messages {
        match message.role {
            Role::System => preamble_parts.push(message.content.clone()),
            Role::User | Role::Tool => history.push(RigMessage::user(message.content.clone())),
            Role::Assistant => history.push(RigMessage::assistant(message.content.clone())),
        }
    }

    let prompt = history.pop().unwrap_or_else(|| RigMessage::user(""));
    let preamble = if preamble_parts.is_empty() {
        None
    } else {
        Some(preamble_parts.join("\n\n"))
    };
    (preamble, history, prompt)
}

impl<M: CompletionModel> RigAdapter<M> {
    fn unavailable(&self, reason: impl std::fmt::Display) -> LlmError {
        LlmError::Unavailable {
            provider: self.model_name.clone(),
            reason: reason.to_string(),
        }
    }

    async fn run(
        &self,
        messages: &[ChatMessage],
        tools: Vec<crate::llm::provider::ToolDefinition>,
        max_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> Result<(Option<String>, Vec<ToolCall>), LlmError> {
        let (preamble, history, prompt) = to_rig_parts(messages);

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(max_tokens) = max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        if let Some(temperature) = temperature {
            builder = builder.temperature(temperature);
        }
        if !tools.is_empty() {
            builder = builder.tools(
                tools
                    .into_iter()
                    .map(|tool| rig::completion::ToolDefinition {
                        name: tool.name,
                        description: tool.description,
                        parameters: tool.parameters,
                    })
                    .collect(),
            );
        }

        let response = self
            .model
            .completion(builder.build())
            .await
            .map_err(|e| self.unavailable(e))?;

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for content in response.choice.iter() {
            match content {
                AssistantContent::Text(text) => text_parts.push(text.text.clone()),
                AssistantContent::ToolCall(call) => tool_calls.push(ToolCall {
                    name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                }),
                _ => {}
            }
        }

        let content = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.join(""))
        };
        Ok((content, tool_calls))
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (content, _) = self
            .run(
                &request.messages,
                Vec::new(),
                request.max_tokens,
                request.temperature,
            )
            .await?;
        Ok(CompletionResponse {
            content: content.unwrap_or_default(),
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let (content, tool_calls) = self
            .run(
                &request.messages,
                request.tools,
                request.max_tokens,
                request.temperature,
            )
            .await?;
        Ok(ToolCompletionResponse {
            content,
            tool_calls,
        })
    }
}

/// Bridges rig's `EmbeddingModel` trait to our `Embedder` trait.
pub struct RigEmbedder<M> {
    model: M,
    model_name: String,
}

impl<M> RigEmbedder<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M: EmbeddingModel> Embedder for RigEmbedder<M> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self
            .model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(embeddings
            .into_iter()
            .map(|e| e.vec.into_iter().map(|v| v as f32).collect())
            .collect())
    }
}
