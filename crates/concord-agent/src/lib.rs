//! Bounded reasoning loop for concord agents.
//!
//! An [`AgentRunner`] asks a language model what to do next, runs the tool it
//! picks, feeds the result back as an observation and repeats until the model
//! gives a final answer or the step budget runs out. The orchestrator sees
//! every agent through the [`Agent`] trait, so runners and plain async
//! closures ([`FnAgent`]) are interchangeable.

/// The orchestrator-facing `Agent` trait.
pub mod agent;
/// Persona and loop limits.
pub mod config;
/// Bounded message history.
pub mod context;
/// Parsing of model decisions.
pub mod decision;
/// Language model seam.
pub mod llm;
/// Session history storage.
pub mod memory;
/// The reasoning loop.
pub mod runner;
/// Tools and the tool registry.
pub mod tool;
/// Per-step trace records.
pub mod trace;

pub use agent::{Agent, FnAgent};
pub use config::{AgentPersona, RunnerConfig};
pub use context::ContextWindow;
pub use decision::{parse_decision, Decision, ParseFailure};
pub use llm::LlmClient;
pub use memory::{InMemoryStore, MemoryStore};
pub use runner::{AgentOutcome, AgentRunner, STEP_LIMIT_ANSWER};
pub use tool::{Tool, ToolArgs, ToolContext, ToolDescriptor, ToolRegistry};
pub use trace::{StepKind, StepTrace};
