use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the reasoning loop a [`StepTrace`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// The loop is about to ask the model.
    Thought,
    /// A tool call was issued.
    Action,
    /// A tool result or error was fed back.
    Observation,
    /// The model answered.
    Final,
}

/// One timestamped, step-numbered record of the reasoning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    /// When the record was created.
    pub timestamp: DateTime<Utc>,
    /// Zero-based model call index.
    pub step: u32,
    /// What happened.
    pub kind: StepKind,
    /// Thought text, tool arguments, tool result or answer.
    pub content: String,
    /// Tool involved, for actions and observations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Time spent in the tool or model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Set when a tool failed or the output was malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepTrace {
    fn new(step: u32, kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            step,
            kind,
            content: content.into(),
            tool: None,
            duration_ms: None,
            error: None,
        }
    }

    /// A thought record.
    pub fn thought(step: u32, content: impl Into<String>) -> Self {
        Self::new(step, StepKind::Thought, content)
    }

    /// A tool call record.
    pub fn action(step: u32, content: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::new(step, StepKind::Action, content).with_tool(tool)
    }

    /// A tool result record.
    pub fn observation(step: u32, content: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(step, StepKind::Observation, content).with_duration(duration_ms)
    }

    /// The final answer record.
    pub fn final_answer(step: u32, content: impl Into<String>, duration_ms: u64) -> Self {
        Self::new(step, StepKind::Final, content).with_duration(duration_ms)
    }

    /// Set `tool`.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Set `duration`.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Set `error`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Whether an error is attached.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
