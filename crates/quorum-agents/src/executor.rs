use crate::{ResponderKind, ResponderRegistry, ResponderResult};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

/// Runs the routed responders concurrently and collects their results.
///
/// Each invocation owns its own retrieval and generation calls; nothing is
/// shared but the backend clients behind `Arc`. The executor waits for every
/// invocation - a slow sibling is never cancelled because another finished
/// or failed.
pub struct FanoutExecutor {
    registry: Arc<ResponderRegistry>,
}

impl FanoutExecutor {
    pub fn new(registry: Arc<ResponderRegistry>) -> Self {
        Self { registry }
    }

    /// Invoke every selected responder for one question. Result order is
    /// not significant downstream. A responder whose task dies outright is
    /// logged and excluded; its siblings still complete. No retries here.
    pub async fn execute(
        &self,
        question: &str,
        kinds: &[ResponderKind],
    ) -> Vec<ResponderResult> {
        info!(
            "Executing responders concurrently: {:?}",
            kinds.iter().map(|k| k.id()).collect::<Vec<_>>()
        );

        let handles: Vec<_> = kinds
            .iter()
            .map(|&kind| {
                let responder = self.registry.get(kind);
                let question = question.to_string();
                tokio::spawn(async move { responder.answer(&question).await })
            })
            .collect();

        let joined = join_all(handles).await;

        let mut results = Vec::with_capacity(joined.len());
        for (kind, outcome) in kinds.iter().zip(joined) {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Responder {} task failed: {}", kind.id(), e);
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use quorum_common::RetrievedFragment;
    use quorum_llm::{GeneratorReply, Message, TextGenerator};
    use quorum_retrieval::FragmentStore;

    /// Store that panics for the IT policy category to simulate a
    /// responder task dying outright.
    struct PanickyStore;

    #[async_trait]
    impl FragmentStore for PanickyStore {
        async fn search(
            &self,
            _query: &str,
            category: Option<&str>,
            _max_results: usize,
        ) -> Result<Vec<RetrievedFragment>> {
            if category == Some("it_policy") {
                panic!("store corrupted");
            }
            Ok(vec![])
        }
    }

    struct FixedGenerator;

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate_with_context(&self, _messages: Vec<Message>) -> Result<GeneratorReply> {
            Ok(GeneratorReply {
                content: "a perfectly fine answer".to_string(),
                finish_reason: None,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn panicking_responder_is_excluded_not_fatal() {
        let registry = Arc::new(ResponderRegistry::new(
            Arc::new(PanickyStore),
            Arc::new(FixedGenerator),
        ));
        let executor = FanoutExecutor::new(registry);

        let results = executor
            .execute(
                "question",
                &[ResponderKind::Research, ResponderKind::ItPolicy],
            )
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].responder, ResponderKind::Research);
        assert!(results[0].success);
    }

    #[tokio::test]
    async fn all_selected_responders_report() {
        let registry = Arc::new(ResponderRegistry::new(
            Arc::new(PanickyStore),
            Arc::new(FixedGenerator),
        ));
        let executor = FanoutExecutor::new(registry);

        let results = executor
            .execute(
                "question",
                &[ResponderKind::Research, ResponderKind::HrPolicy],
            )
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
    }
}
