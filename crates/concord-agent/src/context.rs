use concord_core::ChatMessage;

/// Manages the ordered history handed to the model on each step.
/// Keeps the persona instruction pinned and truncates old turns.
pub struct ContextWindow {
    messages: Vec<ChatMessage>,
    system_prompt: Option<String>,
    max_messages: usize,
}

impl ContextWindow {
    /// Window keeping at most `max_messages` turns (minimum 1).
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            system_prompt: None,
            max_messages: max_messages.max(1),
        }
    }

    /// Pin the system prompt; it is never truncated.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// Append a turn, dropping the oldest ones past the limit.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.truncate();
    }

    /// Turns after the system prompt, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The full history for a model call: system prompt first, then turns.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            out.push(ChatMessage::system(prompt.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    fn truncate(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    /// Rough token estimation (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        let sys_tokens = self
            .system_prompt
            .as_ref()
            .map(|s| s.len() / 4)
            .unwrap_or(0);
        let msg_tokens: usize = self.messages.iter().map(|m| m.content.len() / 4).sum();
        sys_tokens + msg_tokens
    }
}
