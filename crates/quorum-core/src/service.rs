use crate::orchestrator::{Orchestrator, QueryOutcome};
use crate::session::{MessageRole, SessionStore};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// High-level entry point: runs the pipeline and records both sides of the
/// exchange in the session store. The store is purely a sink - a failed
/// write is logged and the query still succeeds.
pub struct QueryService {
    orchestrator: Orchestrator,
    store: Arc<dyn SessionStore>,
}

impl QueryService {
    pub fn new(orchestrator: Orchestrator, store: Arc<dyn SessionStore>) -> Self {
        Self {
            orchestrator,
            store,
        }
    }

    pub async fn process(&self, text: &str, user_id: &str, session_id: &str) -> QueryOutcome {
        if let Err(e) = self
            .store
            .add_message(session_id, MessageRole::User, text, json!({}))
            .await
        {
            warn!("Failed to record user message: {}", e);
        }

        let outcome = self.orchestrator.process_query(text, user_id, session_id).await;

        let metadata = json!({
            "routing": outcome.routing,
            "sources_count": outcome.sources.len(),
            "confidence_level": outcome.confidence_level,
            "processing_time_ms": outcome.processing_time_ms,
        });
        if let Err(e) = self
            .store
            .add_message(session_id, MessageRole::Assistant, &outcome.answer, metadata)
            .await
        {
            warn!("Failed to record assistant message: {}", e);
        }

        outcome
    }
}
