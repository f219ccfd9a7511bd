//! Specialist agents cooperating over one session's profile.
//!
//! Each agent owns one responsibility and one prompt, shares the
//! `LlmProvider` capability, and is invoked by the engine in a fixed order.
//! None of them loop: one engine turn costs a bounded number of model calls.

pub mod extractor;
pub mod interviewer;
pub mod matcher;
pub mod planner;
pub mod summarizer;

pub use extractor::{ExtractionAgent, ExtractionOutcome};
pub use interviewer::InterviewAgent;
pub use matcher::TemplateMatcher;
pub use planner::{Planner, RetirementPlan};
pub use summarizer::Summarizer;

/// Strip a Markdown code fence wrapper, if present, and return the inner
/// text. Models asked for raw JSON still fence it often enough that every
/// JSON-consuming agent tolerates it.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

/// Parse model output as a JSON object, tolerating code fences. Returns
/// `None` for anything that is not an object.
pub(crate) fn parse_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(strip_code_fence(text)) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_fence_plain_text_unchanged() {
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn strip_fence_removes_json_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_json_object("[1, 2]").is_none());
        assert!(parse_json_object("\"text\"").is_none());
        assert!(parse_json_object("not json at all").is_none());
        assert!(parse_json_object("{\"k\": \"v\"}").is_some());
    }
}
