use crate::evaluator::EvaluationOutcome;
use crate::splitter::Question;
use quorum_agents::{ResponderResult, RoutingDecision};
use quorum_common::RetrievedFragment;
use std::time::Instant;

/// Merge two partial responder result sets. Plain concatenation: the
/// operation is associative and downstream consumers never rely on order.
pub fn merge_responses(
    mut left: Vec<ResponderResult>,
    mut right: Vec<ResponderResult>,
) -> Vec<ResponderResult> {
    left.append(&mut right);
    left
}

/// Per-request aggregate threaded through the pipeline. Created when a
/// query arrives, owned exclusively by that request, and discarded once the
/// response is built - nothing here survives across requests.
pub struct OrchestrationState {
    pub questions: Vec<Question>,
    pub routings: Vec<RoutingDecision>,
    pub responses: Vec<ResponderResult>,
    pub final_answer: String,
    pub primary_responder: String,
    pub sources: Vec<RetrievedFragment>,
    pub evaluation: Option<EvaluationOutcome>,
    pub started: Instant,
}

impl OrchestrationState {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            routings: Vec::new(),
            responses: Vec::new(),
            final_answer: String::new(),
            primary_responder: String::new(),
            sources: Vec::new(),
            evaluation: None,
            started: Instant::now(),
        }
    }

    /// Append a batch of responder results to the accumulated list.
    pub fn absorb_responses(&mut self, results: Vec<ResponderResult>) {
        self.responses = merge_responses(std::mem::take(&mut self.responses), results);
    }

    /// Mean routing confidence across all split questions; feeds the
    /// evaluator when a batch produced several routing decisions.
    pub fn mean_routing_confidence(&self) -> f32 {
        if self.routings.is_empty() {
            return 0.5;
        }
        let total: f32 = self.routings.iter().map(|r| r.confidence).sum();
        total / self.routings.len() as f32
    }
}
