use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// Append-only sink for conversation history. The pipeline never reads it
/// back; failures here must not fail a query.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<()>;
}

/// Process-local store for the CLI and for tests.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, session_id: &str) -> Vec<StoredMessage> {
        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            metadata,
        };

        self.sessions
            .lock()
            .expect("session store lock poisoned")
            .entry(session_id.to_string())
            .or_default()
            .push(message);

        debug!("Added {} message to session {}", role.as_str(), session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_append_in_order() {
        let store = InMemorySessionStore::new();

        store
            .add_message("s1", MessageRole::User, "hello", serde_json::json!({}))
            .await
            .unwrap();
        store
            .add_message("s1", MessageRole::Assistant, "hi", serde_json::json!({}))
            .await
            .unwrap();

        let messages = store.messages("s1");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_ne!(messages[0].id, messages[1].id);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemorySessionStore::new();

        store
            .add_message("a", MessageRole::User, "x", serde_json::json!({}))
            .await
            .unwrap();

        assert!(store.messages("b").is_empty());
    }
}
