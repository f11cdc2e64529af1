use async_trait::async_trait;
use concord_core::ConcordResult;
use std::future::Future;

/// A named, callable unit of work as seen by the orchestrator.
///
/// The orchestrator only cares whether the call succeeded and which value it
/// produced; the shape of that value belongs to the agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent on one task input and return its result value.
    async fn invoke(&self, input: &str) -> ConcordResult<serde_json::Value>;
}

/// Adapts an async closure into an [`Agent`].
///
/// ```
/// use concord_agent::{Agent, FnAgent};
///
/// # async fn demo() -> concord_core::ConcordResult<()> {
/// let upper = FnAgent::new(|input: String| async move {
///     Ok(serde_json::Value::String(input.to_uppercase()))
/// });
/// assert_eq!(upper.invoke("hi").await?, "HI");
/// # Ok(())
/// # }
/// ```
pub struct FnAgent<F> {
    f: F,
}

impl<F> FnAgent<F> {
    /// Wrap an async closure.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = ConcordResult<serde_json::Value>> + Send,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = ConcordResult<serde_json::Value>> + Send,
{
    async fn invoke(&self, input: &str) -> ConcordResult<serde_json::Value> {
        (self.f)(input.to_string()).await
    }
}
