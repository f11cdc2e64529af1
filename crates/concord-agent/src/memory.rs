use async_trait::async_trait;
use concord_core::{ChatMessage, ConcordResult};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persists conversation history between runs of the same session.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Load the stored history, or an empty list for a new session.
    async fn load(&self, session_id: &str) -> ConcordResult<Vec<ChatMessage>>;

    /// Replace the stored history of a session.
    async fn save(&self, session_id: &str, history: Vec<ChatMessage>) -> ConcordResult<()>;
}

/// Process-local memory store. Contents are lost on drop.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with saved history.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn load(&self, session_id: &str) -> ConcordResult<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn save(&self, session_id: &str, history: Vec<ChatMessage>) -> ConcordResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), history);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.load("nobody").await.unwrap().is_empty());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_save_replaces_history() {
        let store = InMemoryStore::new();
        store
            .save("s1", vec![ChatMessage::user("one")])
            .await
            .unwrap();
        store
            .save(
                "s1",
                vec![ChatMessage::user("one"), ChatMessage::assistant("two")],
            )
            .await
            .unwrap();

        let history = store.load("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(store.session_count().await, 1);
    }
}
