use async_trait::async_trait;
use concord_core::ConcordResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Arguments passed to a tool, as decoded from the model's `args` object.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// Metadata describing a tool to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Name the model uses in `"tool"`.
    pub name: String,
    /// One line shown to the model.
    pub description: String,
}

impl ToolDescriptor {
    /// Descriptor from a name and a one-line description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Correlation data handed to every tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContext {
    /// Unique per tool call.
    pub trace_id: String,
    /// Persona ID of the calling agent.
    pub agent_id: String,
    /// Memory session of the calling agent.
    pub session_id: String,
}

/// An external capability the model may invoke (HTTP call, lookup, write).
///
/// Errors returned from [`Tool::run`] are fed back to the model as
/// observations; they never abort the reasoning loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name and description shown to the model.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute with the decoded arguments.
    async fn run(&self, args: &ToolArgs, ctx: &ToolContext) -> ConcordResult<serde_json::Value>;
}

/// Central registry for all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its descriptor name, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.descriptor().name.clone();
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
    }

    /// Tool registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Tools whose names appear in `names`, in that order. Unknown names are skipped.
    pub fn subset(&self, names: &[String]) -> Vec<Arc<dyn Tool>> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
