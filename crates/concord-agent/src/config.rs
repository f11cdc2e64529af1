use serde::{Deserialize, Serialize};

/// Identity and instructions of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPersona {
    /// Stable ID; also the trace `agent_id`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short summary of what the persona is for.
    #[serde(default)]
    pub description: String,
    /// Persona instructions placed ahead of the tool list.
    #[serde(default)]
    pub system_prompt: String,
    /// Tools this persona may call. Everything else in the registry is hidden from it.
    #[serde(default)]
    pub tool_names: Vec<String>,
}

impl AgentPersona {
    /// Persona with no instructions and no tools.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            tool_names: Vec::new(),
        }
    }

    /// Set `description`.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set `system_prompt`.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Replace the set of permitted tool names.
    pub fn with_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Limits of the reasoning loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Model calls allowed before the loop gives up with a best-effort answer.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Consecutive corrective re-prompts allowed for malformed output.
    /// Values below 1 are treated as 1.
    #[serde(default = "default_max_corrections")]
    pub max_corrections: u32,
    /// Turns kept in the context window (system prompt excluded).
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_max_steps() -> u32 {
    6
}

fn default_max_corrections() -> u32 {
    1
}

fn default_history_window() -> usize {
    100
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_corrections: default_max_corrections(),
            history_window: default_history_window(),
        }
    }
}
