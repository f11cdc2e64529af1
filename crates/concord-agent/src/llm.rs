use async_trait::async_trait;
use concord_core::{ChatMessage, ConcordResult};

/// Language model collaborator used by the reasoning loop.
///
/// Implementations wrap a concrete provider (HTTP API, local model, test
/// double). The loop only needs the raw completion text; it parses the
/// structured decision itself.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete the conversation and return the model's raw text output.
    async fn chat(&self, messages: &[ChatMessage]) -> ConcordResult<String>;
}
