//! Session state — the unit of isolation for one user interaction.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::agents::RetirementPlan;
use crate::llm::ChatMessage;
use crate::profile::{CompletionMap, ProfileValues};

pub type SessionId = Uuid;

/// Everything one session owns. Cloneable so a turn can run against a
/// working copy and commit only on success.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Active schema of fields being solicited.
    pub completion: CompletionMap,
    /// Extracted values, never deleted during the session.
    pub values: ProfileValues,
    /// The interviewer's conversation view. Append-only between
    /// summarization resets.
    pub interview_log: Vec<ChatMessage>,
    /// Selected goal template, none until the matcher runs.
    pub selected_template: Option<String>,
    /// Running summary maintained by the summarizer.
    pub summary: Option<String>,
    /// Human-readable conversation title, set once after the goal arrives.
    pub title: Option<String>,
    /// Most recent synthesized plan, kept for idempotent re-display.
    pub last_plan: Option<RetirementPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh session: goal-discovery schema, empty values, greeting already
    /// in the interviewer's log.
    pub fn new(greeting: &str) -> Self {
        let now = Utc::now();
        Self {
            completion: CompletionMap::goal_discovery(),
            values: ProfileValues::new(),
            interview_log: vec![ChatMessage::assistant(greeting)],
            selected_template: None,
            summary: None,
            title: None,
            last_plan: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot of every tracked field for the caller: the extracted value,
    /// or `false` as the not-yet-collected sentinel.
    pub fn profile_snapshot(&self) -> serde_json::Map<String, Value> {
        self.completion
            .fields()
            .map(|(field, _)| {
                let value = self
                    .values
                    .get(field)
                    .cloned()
                    .unwrap_or(Value::Bool(false));
                (field.to_string(), value)
            })
            .collect()
    }
}
