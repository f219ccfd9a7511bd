//! Planner — retrieval-augmented synthesis of a structured retirement plan.
//!
//! A strict three-step pipeline per invocation: produce retrieval queries
//! (tool-calling), fetch chunks for each query, synthesize the plan from
//! profile + retrieved context. There is exactly one retrieval round; the
//! model cannot re-query, which bounds the tool-call loop by construction.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agents::strip_code_fence;
use crate::error::{Error, LlmError};
use crate::llm::{
    ChatMessage, CompletionRequest, LlmProvider, ToolCompletionRequest, ToolDefinition,
};
use crate::profile::ProfileValues;
use crate::retrieval::{RetrievalChunk, RetrievalIndex};

const SEARCH_TOOL: &str = "search_corpus";

/// A numeric claim that may legitimately be unknown. Claims without
/// supporting evidence are marked `"unknown"` rather than fabricated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Figure {
    Number(f64),
    Text(String),
}

impl Figure {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Figure::Text(t) if t.eq_ignore_ascii_case("unknown"))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Figure::Number(n) => Some(*n),
            Figure::Text(_) => None,
        }
    }
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Figure::Number(n) => write!(f, "{n}"),
            Figure::Text(t) => write!(f, "{t}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub stocks: Figure,
    pub bonds: Figure,
    pub cash: Figure,
    pub other: Figure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentStrategy {
    pub asset_allocation: AssetAllocation,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsYear {
    pub year: Figure,
    pub annual_contribution: Figure,
    pub expected_growth: Figure,
    #[serde(default)]
    pub source: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub inflation: String,
    pub market_volatility: String,
    pub mitigation_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub age: Figure,
    pub action: String,
    pub expected_outcome: String,
    #[serde(default)]
    pub source: Vec<String>,
}

/// A fact/source/page triple backing a numeric or regulatory claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub fact: String,
    pub source: String,
    pub page: Figure,
}

/// The structured plan contract. `citations` is required even when empty,
/// so an uncited plan is visible as such rather than shape-ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetirementPlan {
    pub investment_strategy: InvestmentStrategy,
    pub savings_plan: Vec<SavingsYear>,
    pub risk_assessment: RiskAssessment,
    pub milestones: Vec<Milestone>,
    pub citations: Vec<Citation>,
}

/// JSON schema the synthesis call must follow, verbatim in the prompt.
const PLAN_SCHEMA: &str = r#"{
  "investment_strategy": {
    "asset_allocation": {"stocks": number, "bonds": number, "cash": number, "other": number},
    "justification": string
  },
  "savings_plan": [
    {"year": integer, "annual_contribution": number, "expected_growth": number, "source": [string]}
  ],
  "risk_assessment": {
    "inflation": string, "market_volatility": string, "mitigation_strategy": string
  },
  "milestones": [
    {"age": integer, "action": string, "expected_outcome": string, "source": [string]}
  ],
  "citations": [
    {"fact": string, "source": string, "page": integer}
  ]
}"#;

pub struct Planner {
    llm: Arc<dyn LlmProvider>,
    index: Arc<RetrievalIndex>,
    max_queries: usize,
    retrieval_k: usize,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        index: Arc<RetrievalIndex>,
        max_queries: usize,
        retrieval_k: usize,
    ) -> Self {
        Self {
            llm,
            index,
            max_queries,
            retrieval_k,
        }
    }

    /// Produce a plan for the given profile.
    pub async fn plan(&self, values: &ProfileValues) -> Result<RetirementPlan, Error> {
        let queries = self.propose_queries(values).await?;
        let chunks = self.retrieve(&queries).await?;
        if chunks.is_empty() {
            tracing::warn!("No corpus evidence retrieved, synthesizing degraded plan");
        }
        self.synthesize(values, &chunks).await
    }

    /// Query phase: let the model request up to `max_queries` corpus
    /// searches. Requesting none is allowed and skips retrieval entirely.
    async fn propose_queries(&self, values: &ProfileValues) -> Result<Vec<String>, LlmError> {
        let instructions = format!(
            "You are a retrieval assistant. Given the user's retirement \
             profile below, prepare up to {max} targeted retrieval queries \
             (each 1-2 sentences) that will return the most relevant document \
             chunks for building a retirement plan. For each query state what \
             evidence you want (e.g., contribution limits, withdrawal rates, \
             tax rules, life expectancy tables) and any date or jurisdiction \
             constraints. Issue each query with the {tool} tool. If the \
             corpus is unlikely to help, issue no queries.",
            max = self.max_queries,
            tool = SEARCH_TOOL,
        );
        let messages = vec![
            ChatMessage::system(instructions),
            ChatMessage::user(format!("User profile:\n{}", values.render_block())),
        ];
        let request = ToolCompletionRequest::new(messages, vec![search_tool_definition()]);
        let response = self.llm.complete_with_tools(request).await?;

        let queries: Vec<String> = response
            .tool_calls
            .iter()
            .filter(|call| call.name == SEARCH_TOOL)
            .filter_map(|call| call.arguments.get("query").and_then(|q| q.as_str()))
            .map(str::to_string)
            .take(self.max_queries)
            .collect();
        tracing::debug!(count = queries.len(), "Retrieval queries proposed");
        Ok(queries)
    }

    /// Retrieve phase: nearest-neighbor lookup per query, results
    /// concatenated in production order.
    async fn retrieve(&self, queries: &[String]) -> Result<Vec<RetrievalChunk>, Error> {
        let mut chunks = Vec::new();
        for query in queries {
            chunks.extend(self.index.search(query, self.retrieval_k).await?);
        }
        Ok(chunks)
    }

    /// Synthesize phase: one schema-constrained completion over profile and
    /// evidence. The response must parse as a `RetirementPlan`.
    async fn synthesize(
        &self,
        values: &ProfileValues,
        chunks: &[RetrievalChunk],
    ) -> Result<RetirementPlan, Error> {
        let context = if chunks.is_empty() {
            "(no supporting documents retrieved)".to_string()
        } else {
            chunks
                .iter()
                .map(|chunk| {
                    format!(
                        "Source: {}, Page: {}\nContent:\n{}",
                        chunk.source,
                        chunk.page,
                        chunk.text.trim()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        };

        let instructions = format!(
            "You are a retirement planning assistant. Produce a comprehensive, \
             structured retirement plan for the user profile below, comparable \
             to a professional financial advisor's.\n\
             Use ONLY the retrieved context for factual claims. Every numeric \
             or regulatory claim must carry a citation (source filename and \
             page) in the citations list. If a value cannot be supported, \
             write \"unknown\" instead of guessing.\n\
             Respond with ONLY valid JSON following this schema exactly:\n\n\
             {PLAN_SCHEMA}\n\n\
             Retrieved context:\n{context}"
        );
        let messages = vec![
            ChatMessage::system(instructions),
            ChatMessage::user(format!("User profile:\n{}", values.render_block())),
        ];
        let request = CompletionRequest::new(messages).with_temperature(0.0);
        let response = self.llm.complete(request).await?;

        let plan: RetirementPlan = serde_json::from_str(strip_code_fence(&response.content))
            .map_err(|e| LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: format!("plan did not match schema: {e}"),
            })?;
        Ok(plan)
    }
}

fn search_tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_TOOL.to_string(),
        description: "Retrieve document chunks relevant to a query from the \
                      planning corpus."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What evidence to look for"
                }
            },
            "required": ["query"]
        }),
    }
}
