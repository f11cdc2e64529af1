use crate::agent::Agent;
use crate::config::{AgentPersona, RunnerConfig};
use crate::context::ContextWindow;
use crate::decision::{answer_text, parse_decision, Decision};
use crate::llm::LlmClient;
use crate::memory::{InMemoryStore, MemoryStore};
use crate::tool::{Tool, ToolArgs, ToolContext, ToolRegistry};
use crate::trace::StepTrace;
use async_trait::async_trait;
use concord_core::{ChatMessage, ConcordError, ConcordResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Answer returned when the step budget runs out without a final decision.
pub const STEP_LIMIT_ANSWER: &str =
    "Unable to complete the task within the configured step limit for this agent.";

/// Result of one reasoning-loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Final answer, or a fixed notice when the step budget ran out.
    pub answer: String,
    /// Model calls made.
    pub steps: u32,
    /// Tools that returned successfully, in call order.
    pub used_tools: Vec<String>,
    /// Every step, in order.
    pub traces: Vec<StepTrace>,
    /// Wall time of the whole run.
    pub total_duration_ms: u64,
    /// `false` when the step budget ran out and `answer` is best effort.
    pub completed: bool,
}

/// The Agent Runner: drives the think → act → observe loop.
/// Prompt → LLM → parse decision → run tool → observe → repeat.
pub struct AgentRunner {
    persona: AgentPersona,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    memory: Arc<dyn MemoryStore>,
    config: RunnerConfig,
    session_id: String,
}

impl AgentRunner {
    /// Runner with default limits, a fresh in-memory store and a random session ID.
    pub fn new(persona: AgentPersona, llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        let session_id = format!("session-{}", persona.id);
        Self {
            persona,
            llm,
            tools,
            memory: Arc::new(InMemoryStore::new()),
            config: RunnerConfig::default(),
            session_id,
        }
    }

    /// Override the loop limits.
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a shared history store.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    /// Session key used to load and save history.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// The persona this runner acts as.
    pub fn persona(&self) -> &AgentPersona {
        &self.persona
    }

    /// Session key for history.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn allowed_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.subset(&self.persona.tool_names)
    }

    fn build_system_prompt(&self) -> String {
        let tool_lines: Vec<String> = self
            .allowed_tools()
            .iter()
            .map(|t| {
                let d = t.descriptor();
                format!("- {}: {}", d.name, d.description)
            })
            .collect();
        let tool_list = if tool_lines.is_empty() {
            "(no tools available)".to_string()
        } else {
            tool_lines.join("\n")
        };

        format!(
            "You are the agent \"{name}\".\n\n\
             Role:\n{description}\n\n\
             Instructions:\n{instructions}\n\n\
             You may call the following tools when you need external data or actions:\n\
             {tool_list}\n\n\
             RESPONSE PROTOCOL (MANDATORY):\n\
             Always reply with strictly valid JSON in one of these forms.\n\
             1) To call a tool:\n\
             {{\"action\": \"tool_call\", \"tool\": \"TOOL_NAME\", \"args\": {{ ... }}}}\n\
             2) To give the final answer:\n\
             {{\"action\": \"final\", \"answer\": \"final answer text\"}}",
            name = self.persona.name,
            description = self.persona.description,
            instructions = self.persona.system_prompt,
        )
    }

    /// Run the reasoning loop for one input.
    ///
    /// Errors only when the model call itself fails or the model keeps
    /// producing malformed output past the correction budget. Tool failures
    /// become observations; an exhausted step budget yields a best-effort
    /// outcome with `completed == false`.
    pub async fn run(&self, input: &str) -> ConcordResult<AgentOutcome> {
        let start = Instant::now();
        let history = self.memory.load(&self.session_id).await?;

        let mut context = ContextWindow::new(self.config.history_window);
        context.set_system_prompt(self.build_system_prompt());
        for msg in &history {
            context.push(msg.clone());
        }
        context.push(ChatMessage::user(input));

        let allowed = self.allowed_tools();
        let max_corrections = self.config.max_corrections.max(1);
        let mut traces = Vec::new();
        let mut used_tools = Vec::new();
        let mut corrections = 0u32;

        info!(agent = %self.persona.id, session = %self.session_id, "Starting reasoning loop");

        for step in 0..self.config.max_steps {
            let step_start = Instant::now();
            traces.push(StepTrace::thought(
                step,
                format!("Analyzing: {}", preview(input, 100)),
            ));

            debug!(
                agent = %self.persona.id,
                step,
                estimated_tokens = context.estimated_tokens(),
                "Calling model"
            );
            let raw = self.llm.chat(&context.to_messages()).await?;
            let step_ms = elapsed_ms(step_start);
            debug!(agent = %self.persona.id, step, "Model responded");

            let decision = match parse_decision(&raw) {
                Ok(decision) => decision,
                Err(failure) => {
                    corrections += 1;
                    traces.push(
                        StepTrace::observation(
                            step,
                            "Invalid response, requesting correction",
                            step_ms,
                        )
                        .with_error(failure.to_string()),
                    );
                    if corrections > max_corrections {
                        warn!(
                            agent = %self.persona.id,
                            step,
                            corrections,
                            error = %failure,
                            "Model output still malformed after corrective re-prompt"
                        );
                        return Err(ConcordError::MalformedOutput(failure.to_string()));
                    }
                    warn!(agent = %self.persona.id, step, error = %failure, "Malformed model output");
                    context.push(ChatMessage::assistant(raw));
                    context.push(ChatMessage::user(failure.corrective_instruction()));
                    continue;
                }
            };
            corrections = 0;

            match decision {
                Decision::Final { answer } => {
                    let answer = answer_text(&answer);
                    traces.push(StepTrace::final_answer(step, answer.clone(), step_ms));

                    let mut new_history = history;
                    new_history.push(ChatMessage::user(input));
                    new_history.push(ChatMessage::assistant(answer.clone()));
                    self.memory.save(&self.session_id, new_history).await?;

                    info!(
                        agent = %self.persona.id,
                        steps = step + 1,
                        tools = used_tools.len(),
                        "Reasoning loop completed"
                    );
                    return Ok(AgentOutcome {
                        answer,
                        steps: step + 1,
                        used_tools,
                        traces,
                        total_duration_ms: elapsed_ms(start),
                        completed: true,
                    });
                }
                Decision::ToolCall { tool, args } => {
                    let args = args.unwrap_or_default();
                    let Some(handle) = allowed.iter().find(|t| t.descriptor().name == tool) else {
                        warn!(agent = %self.persona.id, tool = %tool, "Model requested unavailable tool");
                        traces.push(
                            StepTrace::observation(
                                step,
                                format!("Tool '{tool}' not available"),
                                step_ms,
                            )
                            .with_tool(tool.clone())
                            .with_error(format!("Tool not found: {tool}")),
                        );
                        context.push(ChatMessage::assistant(raw));
                        context.push(ChatMessage::user(format!(
                            "The tool \"{tool}\" is not available to this agent. Use only: {}.",
                            self.persona.tool_names.join(", ")
                        )));
                        continue;
                    };

                    let observation = self
                        .call_tool(handle.as_ref(), &args, step, &mut traces)
                        .await;
                    let feedback = match observation {
                        Ok(value) => {
                            used_tools.push(tool.clone());
                            format!(
                                "Result of tool \"{tool}\": {value}. Decide the next step or give the final answer."
                            )
                        }
                        Err(e) => format!(
                            "Tool \"{tool}\" failed: {e}. Adapt your plan or give the final answer."
                        ),
                    };
                    context.push(ChatMessage::assistant(raw));
                    context.push(ChatMessage::user(feedback));
                }
            }
        }

        warn!(
            agent = %self.persona.id,
            max_steps = self.config.max_steps,
            "Reasoning loop reached max steps"
        );

        Ok(AgentOutcome {
            answer: STEP_LIMIT_ANSWER.to_string(),
            steps: self.config.max_steps,
            used_tools,
            traces,
            total_duration_ms: elapsed_ms(start),
            completed: false,
        })
    }

    /// Execute one tool call and record action + observation traces.
    async fn call_tool(
        &self,
        tool: &dyn Tool,
        args: &ToolArgs,
        step: u32,
        traces: &mut Vec<StepTrace>,
    ) -> ConcordResult<serde_json::Value> {
        let name = tool.descriptor().name.clone();
        traces.push(StepTrace::action(step, format!("Executing: {name}"), name.clone()));

        let ctx = ToolContext {
            trace_id: Uuid::new_v4().to_string(),
            agent_id: self.persona.id.clone(),
            session_id: self.session_id.clone(),
        };

        info!(agent = %self.persona.id, tool = %name, trace_id = %ctx.trace_id, "Executing tool call");
        let tool_start = Instant::now();
        let result = tool.run(args, &ctx).await;
        let duration = elapsed_ms(tool_start);

        match &result {
            Ok(value) => traces.push(
                StepTrace::observation(
                    step,
                    format!("Result: {}", preview(&value.to_string(), 200)),
                    duration,
                )
                .with_tool(name),
            ),
            Err(e) => {
                warn!(agent = %self.persona.id, tool = %name, error = %e, "Tool execution failed");
                traces.push(
                    StepTrace::observation(step, format!("Error: {e}"), duration)
                        .with_tool(name)
                        .with_error(e.to_string()),
                );
            }
        }
        result
    }
}

#[async_trait]
impl Agent for AgentRunner {
    async fn invoke(&self, input: &str) -> ConcordResult<serde_json::Value> {
        let outcome = self.run(input).await?;
        Ok(serde_json::to_value(outcome)?)
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tool::ToolDescriptor;
    use crate::trace::StepKind;
    use concord_core::Role;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// Returns scripted responses in order and records every history it saw.
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(&self, messages: &[ChatMessage]) -> ConcordResult<String> {
            self.seen.lock().await.push(messages.to_vec());
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                Err(ConcordError::Llm("script exhausted".into()))
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    struct CountingTool {
        descriptor: ToolDescriptor,
        calls: AtomicU32,
        fail: bool,
    }

    impl CountingTool {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                descriptor: ToolDescriptor::new(name, "test tool"),
                calls: AtomicU32::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn run(&self, args: &ToolArgs, ctx: &ToolContext) -> ConcordResult<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConcordError::Tool("service unavailable".into()));
            }
            Ok(serde_json::json!({"agent": ctx.agent_id, "args": args}))
        }
    }

    fn runner(llm: Arc<ScriptedLlm>, tools: Vec<Arc<CountingTool>>) -> AgentRunner {
        let mut registry = ToolRegistry::new();
        let mut names = Vec::new();
        for tool in tools {
            names.push(tool.descriptor.name.clone());
            registry.register(tool);
        }
        let persona = AgentPersona::new("clerk", "Clerk")
            .with_description("Files things")
            .with_tools(names);
        AgentRunner::new(persona, llm, Arc::new(registry))
    }

    #[tokio::test]
    async fn test_final_on_first_step() {
        let llm = Arc::new(ScriptedLlm::new(&[r#"{"action":"final","answer":"done"}"#]));
        let outcome = runner(llm.clone(), vec![]).run("file it").await.unwrap();

        assert!(outcome.completed);
        assert_eq!(outcome.answer, "done");
        assert_eq!(outcome.steps, 1);
        let kinds: Vec<StepKind> = outcome.traces.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![StepKind::Thought, StepKind::Final]);

        let seen = llm.seen.lock().await;
        assert_eq!(seen[0][0].role, Role::System);
        assert_eq!(seen[0].last().unwrap().content, "file it");
    }

    #[tokio::test]
    async fn test_tool_call_then_final() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"action":"tool_call","tool":"lookup","args":{"id":7}}"#,
            r#"{"action":"final","answer":"found"}"#,
        ]));
        let tool = CountingTool::new("lookup", false);
        let outcome = runner(llm.clone(), vec![tool.clone()])
            .run("find 7")
            .await
            .unwrap();

        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.used_tools, vec!["lookup".to_string()]);
        assert_eq!(outcome.steps, 2);
        assert!(outcome
            .traces
            .iter()
            .any(|t| t.kind == StepKind::Action && t.tool.as_deref() == Some("lookup")));

        // The second model call sees the tool result as an observation.
        let seen = llm.seen.lock().await;
        let feedback = &seen[1].last().unwrap().content;
        assert!(feedback.contains("Result of tool \"lookup\""));
        assert!(feedback.contains("clerk"));
    }

    #[tokio::test]
    async fn test_tool_error_is_observed_not_fatal() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"action":"tool_call","tool":"lookup"}"#,
            r#"{"action":"final","answer":"gave up politely"}"#,
        ]));
        let tool = CountingTool::new("lookup", true);
        let outcome = runner(llm.clone(), vec![tool]).run("find").await.unwrap();

        assert!(outcome.completed);
        assert!(outcome.used_tools.is_empty());
        let failed: Vec<&StepTrace> = outcome.traces.iter().filter(|t| t.is_error()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, StepKind::Observation);

        let seen = llm.seen.lock().await;
        assert!(seen[1].last().unwrap().content.contains("failed"));
    }

    #[tokio::test]
    async fn test_malformed_output_is_corrected_once() {
        let llm = Arc::new(ScriptedLlm::new(&[
            "Sure! The answer is 4.",
            r#"{"action":"final","answer":"4"}"#,
        ]));
        let outcome = runner(llm.clone(), vec![]).run("2+2").await.unwrap();

        assert_eq!(outcome.answer, "4");
        assert!(outcome
            .traces
            .iter()
            .any(|t| t.kind == StepKind::Observation && t.is_error()));

        let seen = llm.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert!(seen[1].last().unwrap().content.contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_repeated_malformed_output_fails() {
        let llm = Arc::new(ScriptedLlm::new(&["nope", "still nope", "never"]));
        let err = runner(llm.clone(), vec![]).run("2+2").await.unwrap_err();

        assert!(matches!(err, ConcordError::MalformedOutput(_)));
        // One corrective re-prompt happened before giving up.
        assert_eq!(llm.seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"action":"tool_call","tool":"delete_everything"}"#,
            r#"{"action":"final","answer":"ok"}"#,
        ]));
        let outcome = runner(llm.clone(), vec![CountingTool::new("lookup", false)])
            .run("x")
            .await
            .unwrap();

        assert!(outcome.traces.iter().any(|t| t
            .error
            .as_deref()
            .is_some_and(|e| e.contains("delete_everything"))));
        let seen = llm.seen.lock().await;
        assert!(seen[1].last().unwrap().content.contains("lookup"));
    }

    #[tokio::test]
    async fn test_step_limit_is_soft_failure() {
        let call = r#"{"action":"tool_call","tool":"lookup"}"#;
        let llm = Arc::new(ScriptedLlm::new(&[call, call, call]));
        let outcome = runner(llm, vec![CountingTool::new("lookup", false)])
            .with_config(RunnerConfig {
                max_steps: 3,
                ..RunnerConfig::default()
            })
            .run("loop forever")
            .await
            .unwrap();

        assert!(!outcome.completed);
        assert_eq!(outcome.steps, 3);
        assert_eq!(outcome.answer, STEP_LIMIT_ANSWER);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let llm = Arc::new(ScriptedLlm::new(&[]));
        let err = runner(llm, vec![]).run("x").await.unwrap_err();
        assert!(matches!(err, ConcordError::Llm(_)));
    }

    #[tokio::test]
    async fn test_history_is_saved_and_reused() {
        let memory = Arc::new(InMemoryStore::new());
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"action":"final","answer":"first"}"#,
            r#"{"action":"final","answer":"second"}"#,
        ]));
        let agent = runner(llm.clone(), vec![]).with_memory(memory.clone());

        agent.run("one").await.unwrap();
        agent.run("two").await.unwrap();

        let seen = llm.seen.lock().await;
        // system + prior user + prior answer + new input
        assert_eq!(seen[1].len(), 4);
        assert_eq!(seen[1][2].content, "first");
        assert_eq!(memory.load(agent.session_id()).await.unwrap().len(), 4);
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("ação rápida", 4), "ação...");
        assert_eq!(preview("short", 10), "short");
    }
}
