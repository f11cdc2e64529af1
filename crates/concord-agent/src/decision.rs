use crate::tool::ToolArgs;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the model decided to do on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// Invoke a tool and feed its result back.
    #[serde(alias = "tool")]
    ToolCall {
        /// Tool name.
        tool: String,
        /// Arguments; absent means none.
        #[serde(default)]
        args: Option<ToolArgs>,
    },
    /// Stop and return an answer.
    Final {
        /// Answer text, or any JSON value.
        #[serde(default)]
        answer: serde_json::Value,
    },
}

/// Why a model response could not be turned into a [`Decision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Not JSON at all.
    NotJson(String),
    /// JSON, but not an object with a known `action`.
    InvalidAction(String),
}

impl ParseFailure {
    /// Instruction sent back to the model so it can fix its next answer.
    pub fn corrective_instruction(&self) -> &'static str {
        match self {
            ParseFailure::NotJson(_) => {
                "Your answer was not valid JSON. Reply again using exactly the JSON format described in the instructions."
            }
            ParseFailure::InvalidAction(_) => {
                "Your JSON answer must contain \"action\": \"tool_call\" or \"action\": \"final\". Reply again using the format described in the instructions."
            }
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::NotJson(e) => write!(f, "JSON parsing failed: {e}"),
            ParseFailure::InvalidAction(e) => write!(f, "Invalid action format: {e}"),
        }
    }
}

/// Parse raw model output into a [`Decision`].
///
/// Surrounding whitespace and a Markdown code fence (```` ```json ````) are
/// tolerated.
pub fn parse_decision(raw: &str) -> Result<Decision, ParseFailure> {
    let body = strip_code_fence(raw.trim());
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ParseFailure::NotJson(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| ParseFailure::InvalidAction(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Render a final answer as text: strings verbatim, anything else as JSON.
pub fn answer_text(answer: &serde_json::Value) -> String {
    match answer {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_final() {
        let decision = parse_decision(r#"{"action":"final","answer":"42"}"#).unwrap();
        assert_eq!(decision, Decision::Final { answer: json!("42") });
    }

    #[test]
    fn test_parse_tool_call_and_alias() {
        let a = parse_decision(r#"{"action":"tool_call","tool":"search","args":{"q":"x"}}"#)
            .unwrap();
        let b = parse_decision(r#"{"action":"tool","tool":"search","args":{"q":"x"}}"#).unwrap();
        assert_eq!(a, b);
        match a {
            Decision::ToolCall { tool, args } => {
                assert_eq!(tool, "search");
                assert_eq!(args.unwrap()["q"], "x");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_call_without_args() {
        let decision = parse_decision(r#"{"action":"tool_call","tool":"now"}"#).unwrap();
        assert!(matches!(decision, Decision::ToolCall { args: None, .. }));
    }

    #[test]
    fn test_code_fence_is_tolerated() {
        let raw = "```json\n{\"action\":\"final\",\"answer\":\"ok\"}\n```";
        assert!(matches!(parse_decision(raw).unwrap(), Decision::Final { .. }));
    }

    #[test]
    fn test_not_json() {
        let err = parse_decision("I think the answer is 42").unwrap_err();
        assert!(matches!(err, ParseFailure::NotJson(_)));
        assert!(err.to_string().starts_with("JSON parsing failed"));
    }

    #[test]
    fn test_unknown_action() {
        let err = parse_decision(r#"{"action":"dance"}"#).unwrap_err();
        assert!(matches!(err, ParseFailure::InvalidAction(_)));
        let err = parse_decision("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ParseFailure::InvalidAction(_)));
    }

    #[test]
    fn test_answer_text() {
        assert_eq!(answer_text(&json!("plain")), "plain");
        assert_eq!(answer_text(&json!({"k": 1})), r#"{"k":1}"#);
        assert_eq!(answer_text(&serde_json::Value::Null), "");
    }
}
