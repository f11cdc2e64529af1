#![allow(clippy::unwrap_used, clippy::expect_used)]

use concord_core::*;

// ---------------------------------------------------------------------------
// 1. Message history serialization
// ---------------------------------------------------------------------------

#[test]
fn message_history_serialization() {
    let history = vec![
        ChatMessage::system("You are a careful assistant."),
        ChatMessage::user("Summarize the case."),
        ChatMessage::assistant("{\"action\":\"final\",\"answer\":\"done\"}"),
    ];

    let json = serde_json::to_string(&history).unwrap();
    let parsed: Vec<ChatMessage> = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed, history);
    assert_eq!(parsed[0].role, Role::System);
}

// ---------------------------------------------------------------------------
// 2. Error variants carry the data callers act on
// ---------------------------------------------------------------------------

#[test]
fn circuit_open_error_reports_wait_time() {
    let err = ConcordError::CircuitOpen {
        agent: "researcher".into(),
        retry_after_ms: 1500,
    };
    let msg = err.to_string();
    assert!(msg.contains("researcher"));
    assert!(msg.contains("1500"));
    assert!(err.is_retryable());
}

#[test]
fn batch_level_errors_are_not_retryable() {
    let errors = [
        ConcordError::CyclicDependency {
            task_id: "a".into(),
        },
        ConcordError::UnknownDependency {
            task_id: "a".into(),
            dependency: "ghost".into(),
        },
        ConcordError::DuplicateTask("a".into()),
        ConcordError::Config("bad".into()),
    ];
    for err in &errors {
        assert!(!err.is_retryable(), "{err} should not be retryable");
    }
}

#[test]
fn json_errors_convert_with_question_mark() {
    fn parse(raw: &str) -> ConcordResult<serde_json::Value> {
        Ok(serde_json::from_str(raw)?)
    }

    let err = parse("{not json").unwrap_err();
    assert!(matches!(err, ConcordError::Json(_)));
}
