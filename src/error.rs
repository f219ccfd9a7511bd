//! Error types for NestWise.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl Error {
    /// Whether this error aborted a turn and left the session untouched.
    ///
    /// Transports use this to render a generic "try again" reply instead of
    /// surfacing provider internals to the user.
    pub fn is_turn_fatal(&self) -> bool {
        matches!(self, Error::Llm(_) | Error::Retrieval(_))
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Backend {backend} does not support {capability}")]
    UnsupportedCapability { backend: String, capability: String },
}

/// LLM provider errors.
///
/// `Unavailable` and `Timeout` are infrastructure failures: the turn they
/// occur in is treated as not having happened. `InvalidResponse` is reserved
/// for calls whose contract demands a parseable shape (plan synthesis);
/// extraction and classification recover locally instead.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Provider {provider} call timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Retrieval index errors — corpus loading and embedding.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding failed: {reason}")]
    Embedding { reason: String },

    #[error("Embedder returned {got} vectors for {expected} inputs")]
    EmbeddingCountMismatch { expected: usize, got: usize },
}

/// Orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Empty user message")]
    EmptyMessage,
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
