//! End-to-end engine turns against a scripted LLM provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nestwise::config::EngineConfig;
use nestwise::engine::{Engine, TurnReply};
use nestwise::error::{Error, LlmError};
use nestwise::llm::{
    ChatMessage, CompletionRequest, CompletionResponse, Embedder, LlmProvider, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};
use nestwise::retrieval::{RetrievalChunk, RetrievalIndex};

// ── Scripted provider ───────────────────────────────────────────────

enum Step {
    Text(String),
    Tools(Vec<ToolCall>),
    Fail,
}

/// Plays back a fixed script of responses. Every completed call records the
/// request it saw; consuming more steps than scripted panics the test.
struct ScriptedLlm {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn expect_text(&self, content: &str) {
        self.steps
            .lock()
            .unwrap()
            .push_back(Step::Text(content.to_string()));
    }

    fn expect_tools(&self, calls: Vec<ToolCall>) {
        self.steps.lock().unwrap().push_back(Step::Tools(calls));
    }

    fn expect_fail(&self) {
        self.steps.lock().unwrap().push_back(Step::Fail);
    }

    fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    fn recorded(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider script exhausted: unexpected model call")
    }

    fn unavailable() -> LlmError {
        LlmError::Unavailable {
            provider: "scripted".into(),
            reason: "scripted outage".into(),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.messages);
        match self.next_step() {
            Step::Text(content) => Ok(CompletionResponse { content }),
            Step::Tools(_) => panic!("script mismatch: tool step hit a plain completion"),
            Step::Fail => Err(Self::unavailable()),
        }
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.messages);
        match self.next_step() {
            Step::Text(content) => Ok(ToolCompletionResponse {
                content: Some(content),
                tool_calls: Vec::new(),
            }),
            Step::Tools(tool_calls) => Ok(ToolCompletionResponse {
                content: None,
                tool_calls,
            }),
            Step::Fail => Err(Self::unavailable()),
        }
    }
}

/// Deterministic bag-of-letters embedding, good enough to rank chunks.
struct LetterEmbedder;

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vec = vec![0.0f32; 26];
                for c in text.to_ascii_lowercase().chars() {
                    if c.is_ascii_lowercase() {
                        vec[(c as u8 - b'a') as usize] += 1.0;
                    }
                }
                vec
            })
            .collect())
    }
}

async fn corpus_index() -> Arc<RetrievalIndex> {
    Arc::new(
        RetrievalIndex::from_chunks(
            vec![RetrievalChunk {
                text: "Annual retirement contribution limits are 24000.".into(),
                source: "limits.txt".into(),
                page: 3,
            }],
            Arc::new(LetterEmbedder),
        )
        .await
        .unwrap(),
    )
}

async fn empty_index() -> Arc<RetrievalIndex> {
    Arc::new(
        RetrievalIndex::from_chunks(Vec::new(), Arc::new(LetterEmbedder))
            .await
            .unwrap(),
    )
}

fn search_call(query: &str) -> ToolCall {
    ToolCall {
        name: "search_corpus".into(),
        arguments: serde_json::json!({ "query": query }),
    }
}

const PLAN_JSON: &str = r#"{
  "investment_strategy": {
    "asset_allocation": {"stocks": 55, "bonds": 35, "cash": 5, "other": 5},
    "justification": "Spend-down profile with a fixed horizon."
  },
  "savings_plan": [
    {"year": 2027, "annual_contribution": 24000, "expected_growth": 0.05, "source": ["limits.txt"]}
  ],
  "risk_assessment": {
    "inflation": "moderate",
    "market_volatility": "tapering",
    "mitigation_strategy": "bond glide path"
  },
  "milestones": [
    {"age": 62, "action": "begin withdrawals", "expected_outcome": "funded travel", "source": ["limits.txt"]}
  ],
  "citations": [
    {"fact": "contribution limit 24000", "source": "limits.txt", "page": 3}
  ]
}"#;

const DEGRADED_PLAN_JSON: &str = r#"{
  "investment_strategy": {
    "asset_allocation": {"stocks": "unknown", "bonds": "unknown", "cash": "unknown", "other": "unknown"},
    "justification": "No supporting evidence was available."
  },
  "savings_plan": [],
  "risk_assessment": {
    "inflation": "unknown",
    "market_volatility": "unknown",
    "mitigation_strategy": "unknown"
  },
  "milestones": [],
  "citations": []
}"#;

fn question(reply: &TurnReply) -> &str {
    match reply {
        TurnReply::Question(text) => text,
        TurnReply::Plan(_) => panic!("expected a question, got a plan"),
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

/// A stated goal flows through extraction, classification, template switch,
/// and back to the interviewer, with reconciliation of early answers.
#[tokio::test]
async fn goal_message_selects_template_and_keeps_interviewing() {
    let llm = ScriptedLlm::new();
    let engine = Engine::new(EngineConfig::default(), llm.clone(), empty_index().await);
    let session = engine.create_session().await;

    // extraction: goal plus an early answer for a field the spend template
    // will track; title; classification; next question
    llm.expect_text(r#"{"goal": "I want to retire early and travel", "retirement_age": 62}"#);
    llm.expect_text("Early Retirement Travel Plan");
    llm.expect_text("spend");
    llm.expect_text("Roughly how much would you like to spend each month?");

    let output = engine
        .advance(session, "I want to retire early and travel, ideally at 62")
        .await
        .unwrap();

    assert_eq!(
        question(&output.reply),
        "Roughly how much would you like to spend each month?"
    );
    assert_eq!(
        output.conversation_title.as_deref(),
        Some("Early Retirement Travel Plan")
    );

    // The active schema is now the spend template, goal no longer tracked.
    let fields: Vec<&str> = output.profile.keys().map(String::as_str).collect();
    assert_eq!(
        fields,
        vec![
            "desired_monthly_spending",
            "large_planned_expenses",
            "lifestyle_upgrades",
            "retirement_age",
            "travel_frequency"
        ]
    );
    assert!(!output.profile.contains_key("goal"));
    // Reconciled: the early answer survived the switch...
    assert_eq!(output.profile["retirement_age"], serde_json::json!(62));
    // ...and untouched fields use the sentinel.
    assert_eq!(output.profile["desired_monthly_spending"], serde_json::json!(false));

    assert_eq!(llm.remaining(), 0);
}

/// Once every tracked field is collected the planner runs its single
/// query-retrieve-synthesize round, and later turns re-render the stored
/// plan without re-planning.
#[tokio::test]
async fn ready_profile_plans_once_then_rerenders() {
    let llm = ScriptedLlm::new();
    let engine = Engine::new(EngineConfig::default(), llm.clone(), corpus_index().await);
    let session = engine.create_session().await;

    // Turn 1: goal arrives, spend template selected.
    llm.expect_text(r#"{"goal": "spend it all travelling", "retirement_age": 62}"#);
    llm.expect_text("Spend-Down Travel Retirement");
    llm.expect_text("spend");
    llm.expect_text("How much per month?");
    engine
        .advance(session, "I want to spend it all travelling, retiring at 62")
        .await
        .unwrap();

    // Turn 2: everything else arrives at once; planner runs.
    llm.expect_text(
        r#"{"desired_monthly_spending": 6000, "large_planned_expenses": "a boat",
            "travel_frequency": "monthly", "lifestyle_upgrades": "none"}"#,
    );
    llm.expect_tools(vec![search_call("retirement contribution limits")]);
    llm.expect_text(PLAN_JSON);

    let output = engine
        .advance(session, "6000 a month, a boat, monthly trips, no upgrades")
        .await
        .unwrap();
    let TurnReply::Plan(plan) = &output.reply else {
        panic!("expected a plan");
    };
    assert_eq!(plan.citations[0].source, "limits.txt");
    assert_eq!(llm.remaining(), 0);

    // The retrieved evidence reached the synthesis prompt.
    let synth = llm
        .recorded()
        .into_iter()
        .flatten()
        .find(|m| m.content.contains("Retrieved context:"))
        .expect("synthesis prompt missing");
    assert!(synth.content.contains("Source: limits.txt, Page: 3"));

    // Turn 3: extraction finds nothing new; the stored plan is re-rendered
    // with no planner calls (the script only covers extraction).
    llm.expect_text("{}");
    let output = engine.advance(session, "thanks, show me again?").await.unwrap();
    let TurnReply::Plan(plan_again) = &output.reply else {
        panic!("expected the stored plan");
    };
    assert_eq!(plan_again, plan);
    assert_eq!(llm.remaining(), 0);
}

/// With a partial-completion threshold, an uncollected critical field still
/// vetoes planning until it arrives.
#[tokio::test]
async fn critical_field_blocks_planning_at_partial_threshold() {
    let llm = ScriptedLlm::new();
    let config = EngineConfig {
        completeness_threshold: 0.5,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, llm.clone(), empty_index().await);
    let session = engine.create_session().await;

    // Turn 1: goal classified into the save template.
    llm.expect_text(r#"{"goal": "make my savings last"}"#);
    llm.expect_text("Conservative Savings Longevity Plan");
    llm.expect_text("save");
    llm.expect_text("At what age do you plan to retire?");
    engine
        .advance(session, "I mostly want my savings to last")
        .await
        .unwrap();

    // Turn 2: ratio clears 0.5 (11/21) but both importance-5 fields are
    // still open, so the session keeps interviewing.
    llm.expect_text(
        r#"{"retirement_age": 65, "risk_tolerance": "low", "expected_retirement_duration": 25}"#,
    );
    llm.expect_text("What monthly expenses do you expect in retirement?");
    let output = engine
        .advance(session, "65, low risk, for about 25 years")
        .await
        .unwrap();
    assert!(matches!(output.reply, TurnReply::Question(_)));

    // Turn 3: the critical fields arrive and planning proceeds. Retrieval
    // finds nothing, so the plan is degraded but still schema-valid, with
    // the citations field present and empty.
    llm.expect_text(r#"{"expected_monthly_expenses": 3000, "healthcare_budget": 800}"#);
    llm.expect_text("no queries needed");
    llm.expect_text(DEGRADED_PLAN_JSON);
    let output = engine
        .advance(session, "3000 a month, 800 for healthcare")
        .await
        .unwrap();
    let TurnReply::Plan(plan) = &output.reply else {
        panic!("expected a plan");
    };
    assert!(plan.citations.is_empty());
    assert!(plan.investment_strategy.asset_allocation.stocks.is_unknown());
    assert_eq!(llm.remaining(), 0);
}

/// An infrastructure failure mid-turn leaves the session exactly as it was:
/// the next turn's extraction still sees every field uncollected.
#[tokio::test]
async fn failed_turn_preserves_pre_turn_state() {
    let llm = ScriptedLlm::new();
    let engine = Engine::new(EngineConfig::default(), llm.clone(), empty_index().await);
    let session = engine.create_session().await;

    // Extraction and title succeed on the working copy, then the matcher
    // call dies. Nothing may commit.
    llm.expect_text(r#"{"goal": "retire early"}"#);
    llm.expect_text("Early Retirement");
    llm.expect_fail();
    let err = engine.advance(session, "I want to retire early").await.unwrap_err();
    assert!(matches!(err, Error::Llm(LlmError::Unavailable { .. })));
    assert!(err.is_turn_fatal());

    // Retry: the fresh extraction request proves goal was rolled back, and
    // the title is generated again because none was committed.
    llm.expect_text(r#"{"goal": "retire early"}"#);
    llm.expect_text("Early Retirement");
    llm.expect_text("default");
    llm.expect_text("What age are you targeting?");
    let output = engine.advance(session, "I want to retire early").await.unwrap();
    assert_eq!(
        output.conversation_title.as_deref(),
        Some("Early Retirement")
    );

    let extraction_requests: Vec<_> = llm
        .recorded()
        .into_iter()
        .filter(|messages| {
            messages
                .first()
                .is_some_and(|m| m.content.starts_with("You will be analyzing"))
        })
        .collect();
    assert_eq!(extraction_requests.len(), 2);
    // Both extraction calls saw the goal uncollected.
    for request in &extraction_requests {
        assert!(request[1].content.contains("goal (collected: false)"));
    }
}

/// Compaction triggers exactly at the message-count threshold, not below.
#[tokio::test]
async fn summarization_triggers_exactly_at_threshold() {
    let llm = ScriptedLlm::new();
    let config = EngineConfig {
        summarize_threshold: 7,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config, llm.clone(), empty_index().await);
    let session = engine.create_session().await;

    // Turn 1 ends with 5 logged messages: persona, greeting, user, status,
    // reply. Below the threshold, so no summarizer call is scripted.
    llm.expect_text("{}");
    llm.expect_text("What is your retirement goal?");
    engine.advance(session, "hello there").await.unwrap();
    assert_eq!(llm.remaining(), 0);

    // Turn 2 ends with 7 logged messages, exactly at the threshold: the
    // summarizer runs and the log collapses.
    llm.expect_text("{}");
    llm.expect_text("Could you share your retirement goal?");
    llm.expect_text("User has not yet shared a goal.");
    engine.advance(session, "still thinking").await.unwrap();
    assert_eq!(llm.remaining(), 0);

    // Turn 3's interviewer call sees the compacted history: persona,
    // summary, last reply, new user message, status = 5 messages.
    llm.expect_text("{}");
    llm.expect_text("Take your time - any thoughts on a goal?");
    engine.advance(session, "ok").await.unwrap();

    let interview_requests: Vec<_> = llm
        .recorded()
        .into_iter()
        .filter(|messages| {
            messages
                .iter()
                .any(|m| m.content.starts_with("Below is the user's current profile status."))
        })
        .collect();
    let last = interview_requests.last().unwrap();
    assert_eq!(last.len(), 5);
    assert!(last[1].content.starts_with("Summary:"));
}

/// Unknown session ids and empty messages are rejected without touching
/// any state.
#[tokio::test]
async fn invalid_inputs_are_rejected() {
    let llm = ScriptedLlm::new();
    let engine = Engine::new(EngineConfig::default(), llm.clone(), empty_index().await);

    let missing = uuid::Uuid::new_v4();
    assert!(engine.advance(missing, "hello").await.is_err());

    let session = engine.create_session().await;
    assert!(engine.advance(session, "   ").await.is_err());
    assert_eq!(llm.remaining(), 0);
}
