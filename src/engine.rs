//! Orchestrator — routes each turn through the specialist agents.
//!
//! One external call drives exactly one pass: extract, route, interview or
//! plan, maybe summarize. Routing is completeness-driven, not turn-counted,
//! and every branch terminates within a bounded number of transitions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::agents::{
    ExtractionAgent, InterviewAgent, Planner, RetirementPlan, Summarizer, TemplateMatcher,
    summarizer,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::llm::{ChatMessage, LlmProvider, Role, TimeoutProvider};
use crate::profile::Readiness;
use crate::retrieval::RetrievalIndex;
use crate::session::{SessionId, SessionState};
use crate::templates::TemplateRegistry;

/// Initial assistant message of every session.
pub const GREETING: &str =
    "Hello there, I'm NestWise! How can I help you plan for your retirement?";

/// Where a turn goes after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No template yet and the goal is known: classify it.
    Matcher,
    /// Template selected and the profile is ready: plan.
    Planner,
    /// Otherwise keep interviewing.
    Interviewer,
}

/// Pure routing decision. Matching takes precedence as soon as the goal is
/// known; planning requires a selected template and a ready profile; an
/// uncollected critical field always keeps the session interviewing.
pub fn route(template_selected: bool, goal_known: bool, readiness: &Readiness) -> Route {
    if !template_selected {
        if goal_known {
            Route::Matcher
        } else {
            Route::Interviewer
        }
    } else if readiness.ready {
        Route::Planner
    } else {
        Route::Interviewer
    }
}

/// What a turn produced, tagged explicitly so callers never have to infer
/// it from message text.
#[derive(Debug, Clone)]
pub enum TurnReply {
    /// The interviewer asked (or re-asked) a question.
    Question(String),
    /// The planner produced, or re-rendered, a structured plan.
    Plan(RetirementPlan),
}

/// Result of one engine turn.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub reply: TurnReply,
    /// Every tracked field, with `false` standing in for "not collected".
    pub profile: serde_json::Map<String, serde_json::Value>,
    pub conversation_title: Option<String>,
}

/// The session-scoped orchestration engine.
///
/// Sessions are fully independent; the only shared resource is the
/// read-only retrieval index. Each session's state sits behind its own
/// mutex, held for the whole turn, so two turns of one session can never
/// interleave.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<TemplateRegistry>,
    interviewer: InterviewAgent,
    extractor: ExtractionAgent,
    matcher: TemplateMatcher,
    planner: Planner,
    summarizer: Summarizer,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        llm: Arc<dyn LlmProvider>,
        index: Arc<RetrievalIndex>,
    ) -> Self {
        let config = config.normalized();
        let llm: Arc<dyn LlmProvider> =
            Arc::new(TimeoutProvider::new(llm, config.call_timeout));
        let registry = Arc::new(TemplateRegistry::builtin());

        Self {
            interviewer: InterviewAgent::new(llm.clone()),
            extractor: ExtractionAgent::new(llm.clone()),
            matcher: TemplateMatcher::new(llm.clone(), registry.clone()),
            planner: Planner::new(
                llm.clone(),
                index,
                config.max_queries,
                config.retrieval_k,
            ),
            summarizer: Summarizer::new(llm),
            registry,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The assistant message shown when a session opens.
    pub fn greeting(&self) -> &'static str {
        GREETING
    }

    /// Initialize a new session with the goal-discovery schema.
    pub async fn create_session(&self) -> SessionId {
        let id = SessionId::new_v4();
        let state = SessionState::new(GREETING);
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(state)));
        tracing::info!(session = %id, "Session created");
        id
    }

    /// Run one turn for a session.
    ///
    /// The turn executes against a working copy of the session state and
    /// commits only on success, so a failed turn leaves the session exactly
    /// as it was.
    pub async fn advance(&self, session_id: SessionId, user_message: &str) -> Result<TurnOutput> {
        let user_message = user_message.trim();
        if user_message.is_empty() {
            return Err(EngineError::EmptyMessage.into());
        }

        let handle = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(session_id))?;

        let mut state = handle.lock().await;
        let mut working = state.clone();
        let reply = self.run_turn(&mut working, user_message).await?;
        working.updated_at = Utc::now();
        *state = working;

        Ok(TurnOutput {
            profile: state.profile_snapshot(),
            conversation_title: state.title.clone(),
            reply,
        })
    }

    async fn run_turn(
        &self,
        state: &mut SessionState,
        user_message: &str,
    ) -> Result<TurnReply> {
        // The exchange under extraction is the previous assistant message
        // plus the message that just arrived.
        let last_assistant = state
            .interview_log
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| GREETING.to_string());
        state.interview_log.push(ChatMessage::user(user_message));

        let outcome = self
            .extractor
            .extract(
                &mut state.completion,
                &mut state.values,
                &last_assistant,
                user_message,
                state.title.is_none(),
            )
            .await?;
        if outcome.title.is_some() {
            state.title = outcome.title;
        }

        let readiness = state
            .completion
            .readiness(self.config.completeness_threshold, self.config.max_importance);
        let decision = route(
            state.selected_template.is_some(),
            state.values.contains("goal"),
            &readiness,
        );
        tracing::debug!(
            ?decision,
            ratio = readiness.ratio,
            needs_critical = readiness.needs_critical,
            "Routing decision"
        );

        match decision {
            Route::Matcher => {
                let goal = state.values.as_text("goal").unwrap_or_default();
                let name = self.matcher.classify(&goal).await?;
                let template = self.registry.resolve(&name);
                state.completion.switch_template(template, &state.values);
                state.selected_template = Some(name);
                self.interview(state).await
            }
            Route::Interviewer => self.interview(state).await,
            Route::Planner => {
                if let Some(plan) = &state.last_plan {
                    tracing::debug!("Re-rendering stored plan");
                    return Ok(TurnReply::Plan(plan.clone()));
                }
                let plan = self.planner.plan(&state.values).await?;
                state.last_plan = Some(plan.clone());
                Ok(TurnReply::Plan(plan))
            }
        }
    }

    async fn interview(&self, state: &mut SessionState) -> Result<TurnReply> {
        let question = self
            .interviewer
            .next_message(&mut state.interview_log, &state.completion)
            .await?;

        if state.interview_log.len() >= self.config.summarize_threshold {
            tracing::debug!(
                messages = state.interview_log.len(),
                "Compacting interview history"
            );
            let summary = self
                .summarizer
                .summarize(state.summary.as_deref(), &state.interview_log)
                .await?;
            summarizer::compact_log(&mut state.interview_log, &summary);
            state.summary = Some(summary);
        }

        Ok(TurnReply::Question(question))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_template_with_goal_goes_to_matcher() {
        let readiness = Readiness {
            ready: true,
            needs_critical: false,
            ratio: 1.0,
        };
        assert_eq!(route(false, true, &readiness), Route::Matcher);
    }

    #[test]
    fn no_template_without_goal_keeps_interviewing() {
        let readiness = Readiness {
            ready: false,
            needs_critical: true,
            ratio: 0.0,
        };
        assert_eq!(route(false, false, &readiness), Route::Interviewer);
    }

    #[test]
    fn template_and_ready_goes_to_planner() {
        let readiness = Readiness {
            ready: true,
            needs_critical: false,
            ratio: 1.0,
        };
        assert_eq!(route(true, true, &readiness), Route::Planner);
    }

    #[test]
    fn critical_hole_keeps_interviewing_regardless_of_ratio() {
        let readiness = Readiness {
            ready: false,
            needs_critical: true,
            ratio: 1.0,
        };
        assert_eq!(route(true, true, &readiness), Route::Interviewer);
    }

    #[test]
    fn below_threshold_keeps_interviewing() {
        let readiness = Readiness {
            ready: false,
            needs_critical: false,
            ratio: 0.6,
        };
        assert_eq!(route(true, true, &readiness), Route::Interviewer);
    }
}
