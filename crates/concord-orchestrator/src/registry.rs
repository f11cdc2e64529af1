use concord_agent::Agent;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Agents available to one orchestrator, in registration order.
///
/// Registration order matters: the collaborative pattern polls agents in this
/// order and picks its consensus from it.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    order: Vec<String>,
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Re-registering an ID replaces the agent but keeps
    /// its original position.
    pub fn register(&mut self, id: impl Into<String>, agent: Arc<dyn Agent>) {
        let id = id.into();
        if self.agents.insert(id.clone(), agent).is_none() {
            self.order.push(id.clone());
        }
        info!(agent = %id, "Registered agent");
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_agent(mut self, id: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.register(id, agent);
        self
    }

    /// Agent registered under `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(id).cloned()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Agent IDs in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// `(id, agent)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Agent>)> {
        self.order
            .iter()
            .filter_map(|id| self.agents.get(id).map(|a| (id.as_str(), a)))
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
