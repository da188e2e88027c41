use crate::evaluator::{EvaluationStrategy, Evaluator};
use crate::splitter::split_questions;
use crate::state::OrchestrationState;
use crate::synthesizer::{SynthesizedAnswer, Synthesizer};
use anyhow::Result;
use quorum_agents::{FanoutExecutor, ResponderRegistry, Router, RoutingDecision};
use quorum_common::{ConfidenceLevel, RetrievedFragment};
use quorum_llm::TextGenerator;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Everything a caller gets back for one query. Always well-formed: even a
/// fatal pipeline failure produces a degraded outcome, never a panic or an
/// error crossing this boundary.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub primary_responder: String,
    pub sources: Vec<RetrievedFragment>,
    pub processing_time_ms: u128,
    pub routing: Vec<RoutingDecision>,
    pub confidence: Option<f32>,
    pub confidence_level: ConfidenceLevel,
    pub success: bool,
    pub error: Option<String>,
}

/// Composes splitter, router, fan-out, synthesis and evaluation into the
/// end-to-end query pipeline. The sole entry point external callers use.
///
/// Each request runs the same sequence: split the raw text, then for every
/// question route and fan out, then synthesize, then evaluate. There is no
/// caching anywhere in the pipeline - every query is independent and safe
/// to retry from scratch.
pub struct Orchestrator {
    router: Router,
    executor: FanoutExecutor,
    synthesizer: Synthesizer,
    evaluator: Evaluator,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ResponderRegistry>,
        generator: Arc<dyn TextGenerator>,
        strategy: EvaluationStrategy,
    ) -> Self {
        info!("Orchestrator initialized");
        Self {
            router: Router::new(generator.clone()),
            executor: FanoutExecutor::new(registry),
            synthesizer: Synthesizer::new(generator.clone()),
            evaluator: Evaluator::new(strategy, generator),
        }
    }

    pub async fn process_query(
        &self,
        text: &str,
        user_id: &str,
        session_id: &str,
    ) -> QueryOutcome {
        info!(
            "Processing query for user {} (session {}): {:.100}",
            user_id, session_id, text
        );
        let started = Instant::now();

        match self.run_pipeline(text).await {
            Ok(outcome) => {
                info!(
                    "Query processed in {}ms by {}",
                    outcome.processing_time_ms, outcome.primary_responder
                );
                outcome
            }
            Err(e) => {
                error!("Error processing query: {:#}", e);
                degraded_outcome(&e.to_string(), started)
            }
        }
    }

    async fn run_pipeline(&self, text: &str) -> Result<QueryOutcome> {
        let questions = split_questions(text);
        info!("Split input into {} question(s)", questions.len());

        let mut state = OrchestrationState::new(questions.clone());
        let mut per_question: Vec<(String, SynthesizedAnswer)> = Vec::new();

        for question in &questions {
            let decision = self.router.route(&question.text).await;
            let results = self
                .executor
                .execute(&question.text, &decision.responders)
                .await;
            state.routings.push(decision);
            state.absorb_responses(results.clone());

            // Failed responders are logged but never fed into synthesis.
            let mut usable = Vec::with_capacity(results.len());
            for result in results {
                if result.success {
                    usable.push(result);
                } else {
                    warn!(
                        "{} failed for '{:.60}': {}",
                        result.responder.display_name(),
                        question.text,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }

            let synthesized = self.synthesizer.synthesize(&question.text, usable).await;
            per_question.push((question.text.clone(), synthesized));
        }

        let combined = Synthesizer::combine_batch(per_question);
        state.final_answer = combined.answer.clone();
        state.primary_responder = combined.primary_responder.clone();
        state.sources = combined.sources;

        let source_texts: Vec<String> = state
            .sources
            .iter()
            .map(|s| s.content.clone())
            .collect();
        let evaluation = self
            .evaluator
            .evaluate(
                text,
                &state.final_answer,
                &source_texts,
                state.sources.len(),
                state.mean_routing_confidence(),
            )
            .await;
        state.evaluation = Some(evaluation.clone());

        let outcome = QueryOutcome {
            answer: state.final_answer,
            primary_responder: state.primary_responder,
            sources: state.sources,
            processing_time_ms: state.started.elapsed().as_millis(),
            routing: state.routings,
            confidence: evaluation.confidence,
            confidence_level: evaluation.level,
            success: true,
            error: None,
        };
        Ok(outcome)
    }
}

/// Well-formed response for the unrecoverable path; the external boundary
/// never sees a crash from a single bad query.
fn degraded_outcome(error: &str, started: Instant) -> QueryOutcome {
    QueryOutcome {
        answer: format!(
            "I apologize, but an error occurred while processing your query: {}",
            error
        ),
        primary_responder: "Error".to_string(),
        sources: Vec::new(),
        processing_time_ms: started.elapsed().as_millis(),
        routing: Vec::new(),
        confidence: None,
        confidence_level: ConfidenceLevel::Error,
        success: false,
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_outcome_is_well_formed() {
        let outcome = degraded_outcome("backend unreachable", Instant::now());

        assert!(!outcome.success);
        assert!(outcome.answer.contains("backend unreachable"));
        assert!(outcome.sources.is_empty());
        assert_eq!(outcome.confidence_level, ConfidenceLevel::Error);
        assert_eq!(outcome.error.as_deref(), Some("backend unreachable"));
    }
}
