//! Configuration types.

use std::time::Duration;

/// Engine configuration.
///
/// Defaults mirror the tuned constants of the planning flow: full weighted
/// completion before planning, a 20-message compaction threshold, and a
/// bounded single retrieval round of at most 3 queries with 3 chunks each.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Importance-weighted completion ratio required before planning (0..=1).
    pub completeness_threshold: f64,
    /// Importance weight that marks a field as critical.
    pub max_importance: u8,
    /// Interviewer message count at which the conversation is compacted.
    pub summarize_threshold: usize,
    /// Maximum retrieval queries per planning invocation.
    pub max_queries: usize,
    /// Chunks returned per retrieval query.
    pub retrieval_k: usize,
    /// Per-call timeout on every model invocation.
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completeness_threshold: 1.0,
            max_importance: 5,
            summarize_threshold: 20,
            max_queries: 3,
            retrieval_k: 3,
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Build a config from `NESTWISE_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            completeness_threshold: env_parse(
                "NESTWISE_COMPLETENESS_THRESHOLD",
                defaults.completeness_threshold,
            ),
            max_importance: env_parse("NESTWISE_MAX_IMPORTANCE", defaults.max_importance),
            summarize_threshold: env_parse(
                "NESTWISE_SUMMARIZE_THRESHOLD",
                defaults.summarize_threshold,
            ),
            max_queries: env_parse("NESTWISE_MAX_QUERIES", defaults.max_queries),
            retrieval_k: env_parse("NESTWISE_RETRIEVAL_K", defaults.retrieval_k),
            call_timeout: Duration::from_secs(env_parse("NESTWISE_CALL_TIMEOUT_SECS", 60)),
        }
        .normalized()
    }

    /// Clamp values into their valid ranges. A critical weight below 2 would
    /// make every field critical, so 2 is the floor.
    pub fn normalized(mut self) -> Self {
        self.completeness_threshold = self.completeness_threshold.clamp(0.0, 1.0);
        self.max_importance = self.max_importance.max(2);
        self.max_queries = self.max_queries.max(1);
        self.retrieval_k = self.retrieval_k.max(1);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
