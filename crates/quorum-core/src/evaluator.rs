use anyhow::{Context, Result};
use quorum_common::ConfidenceLevel;
use quorum_llm::{strip_code_fences, TextGenerator};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an answer's trustworthiness is scored. Selected by configuration,
/// never by the evaluator itself. The two strategies score on different
/// methodologies and their numbers are not comparable across a deployment
/// that switches strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStrategy {
    /// Generator-graded quality metrics, averaged.
    ModelAssisted,
    /// Weighted response-characteristic heuristic, always available.
    Heuristic,
}

/// Scoring result. `confidence` is absent when no signal could be
/// computed; `level` is then UNKNOWN.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub confidence: Option<f32>,
    pub level: ConfidenceLevel,
    pub method: &'static str,
    pub breakdown: Option<serde_json::Value>,
}

impl EvaluationOutcome {
    pub fn unknown(method: &'static str) -> Self {
        Self {
            confidence: None,
            level: ConfidenceLevel::Unknown,
            method,
            breakdown: None,
        }
    }
}

struct MetricSpec {
    name: &'static str,
    instruction: &'static str,
    /// Hallucination is scored "higher is worse" and inverted before
    /// averaging.
    inverted: bool,
}

const METRICS: [MetricSpec; 4] = [
    MetricSpec {
        name: "hallucination",
        instruction: "Rate how much of the answer is NOT supported by the context. \
0.0 means every claim is grounded in the context, 1.0 means the answer is fabricated.",
        inverted: true,
    },
    MetricSpec {
        name: "answer_relevance",
        instruction: "Rate how relevant the answer is to the question. \
0.0 means off-topic, 1.0 means it addresses the question directly and completely.",
        inverted: false,
    },
    MetricSpec {
        name: "context_precision",
        instruction: "Rate how much of the provided context is actually pertinent to the question. \
0.0 means none of it matters, 1.0 means all of it is on point.",
        inverted: false,
    },
    MetricSpec {
        name: "context_recall",
        instruction: "Rate how well the provided context covers what is needed to answer the question. \
0.0 means the context is missing everything required, 1.0 means it covers the question fully.",
        inverted: false,
    },
];

const METRIC_SYSTEM_PROMPT: &str = "You are a strict evaluation judge for retrieval-augmented answers.
Score exactly the quality dimension you are asked about, nothing else.
You MUST respond with a single JSON object ONLY: {\"score\": <number between 0.0 and 1.0>}";

#[derive(Debug, Deserialize)]
struct MetricReply {
    score: f32,
}

/// Scores a final answer's trustworthiness. Never fails: total scoring
/// failure degrades to an UNKNOWN outcome with no score.
pub struct Evaluator {
    strategy: EvaluationStrategy,
    generator: Arc<dyn TextGenerator>,
}

impl Evaluator {
    pub fn new(strategy: EvaluationStrategy, generator: Arc<dyn TextGenerator>) -> Self {
        match strategy {
            EvaluationStrategy::ModelAssisted => {
                info!("Evaluator initialized with model-graded metrics")
            }
            EvaluationStrategy::Heuristic => {
                info!("Evaluator initialized with heuristic metrics")
            }
        }
        Self {
            strategy,
            generator,
        }
    }

    pub async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        source_texts: &[String],
        source_count: usize,
        routing_confidence: f32,
    ) -> EvaluationOutcome {
        let outcome = match self.strategy {
            EvaluationStrategy::ModelAssisted => {
                self.model_assisted(question, answer, source_texts).await
            }
            EvaluationStrategy::Heuristic => heuristic(
                answer,
                source_count,
                !source_texts.is_empty(),
                routing_confidence,
            ),
        };

        match outcome.confidence {
            Some(confidence) => info!(
                "[EVALUATION] Confidence: {:.0}% ({}) | Method: {}",
                confidence * 100.0,
                outcome.level,
                outcome.method
            ),
            None => info!("[EVALUATION] No confidence computed | Method: {}", outcome.method),
        }

        outcome
    }

    /// Run every metric the generator can grade; the overall confidence is
    /// the unweighted mean of the ones that succeeded. Individual metric
    /// failures are logged and skipped.
    async fn model_assisted(
        &self,
        question: &str,
        answer: &str,
        source_texts: &[String],
    ) -> EvaluationOutcome {
        let context = if source_texts.is_empty() {
            "(no context was retrieved)".to_string()
        } else {
            source_texts.join("\n---\n")
        };

        let mut scores = Vec::new();
        let mut breakdown = serde_json::Map::new();

        for metric in &METRICS {
            match self.score_metric(metric, question, answer, &context).await {
                Ok(raw) => {
                    let raw = raw.clamp(0.0, 1.0);
                    breakdown.insert(metric.name.to_string(), json!(round3(raw)));
                    let value = if metric.inverted { 1.0 - raw } else { raw };
                    scores.push(value);
                    debug!("Metric {} scored {:.3}", metric.name, raw);
                }
                Err(e) => warn!("Metric {} failed: {}", metric.name, e),
            }
        }

        if scores.is_empty() {
            return EvaluationOutcome::unknown("model");
        }

        let confidence = round3(scores.iter().sum::<f32>() / scores.len() as f32);

        EvaluationOutcome {
            confidence: Some(confidence),
            level: level_for(confidence),
            method: "model",
            breakdown: Some(serde_json::Value::Object(breakdown)),
        }
    }

    async fn score_metric(
        &self,
        metric: &MetricSpec,
        question: &str,
        answer: &str,
        context: &str,
    ) -> Result<f32> {
        let user_prompt = format!(
            "{}\n\nQuestion:\n{}\n\nAnswer:\n{}\n\nContext:\n{}",
            metric.instruction, question, answer, context
        );

        let reply = self
            .generator
            .generate(METRIC_SYSTEM_PROMPT, &user_prompt)
            .await
            .with_context(|| format!("{} metric call failed", metric.name))?;

        let parsed: MetricReply = serde_json::from_str(strip_code_fences(&reply.content))
            .with_context(|| format!("{} metric returned unparseable output", metric.name))?;

        Ok(parsed.score)
    }
}

/// Weighted heuristic over response characteristics; the fallback scoring
/// path that needs nothing but the response itself.
pub(crate) fn heuristic(
    answer: &str,
    source_count: usize,
    has_context: bool,
    routing_confidence: f32,
) -> EvaluationOutcome {
    // Factor 1: routing confidence (30%)
    let routing_score = routing_confidence;

    // Factor 2: sources availability (25%)
    let source_score = if source_count >= 3 {
        1.0
    } else if source_count >= 1 {
        0.7
    } else {
        0.2
    };

    // Factor 3: context availability (20%)
    let context_score = if has_context { 0.9 } else { 0.3 };

    // Factor 4: answer length heuristic (25%)
    let answer_len = answer.chars().count();
    let length_score = if answer_len > 200 {
        0.9
    } else if answer_len > 100 {
        0.7
    } else if answer_len > 50 {
        0.5
    } else {
        0.3
    };

    let confidence = round3(
        routing_score * 0.30 + source_score * 0.25 + context_score * 0.20 + length_score * 0.25,
    );

    EvaluationOutcome {
        confidence: Some(confidence),
        level: level_for(confidence),
        method: "heuristic",
        breakdown: Some(json!({
            "routing": round3(routing_score),
            "sources": round3(source_score),
            "context": round3(context_score),
            "answer_quality": round3(length_score),
        })),
    }
}

fn level_for(confidence: f32) -> ConfidenceLevel {
    if confidence >= 0.8 {
        ConfidenceLevel::High
    } else if confidence >= 0.6 {
        ConfidenceLevel::Medium
    } else if confidence >= 0.4 {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::VeryLow
    }
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// Human-readable explanation of an evaluation outcome.
pub fn confidence_explanation(outcome: &EvaluationOutcome) -> String {
    let confidence = match outcome.confidence {
        Some(c) => c,
        None => return "Unable to evaluate response confidence.".to_string(),
    };
    let percent = (confidence * 100.0).round();

    let mut explanation = match outcome.level {
        ConfidenceLevel::High => format!(
            "This response has high confidence ({percent:.0}%). The answer appears well-supported by the retrieved context and relevant to your question."
        ),
        ConfidenceLevel::Medium => format!(
            "This response has moderate confidence ({percent:.0}%). The answer is reasonably supported by context, but some aspects may need verification."
        ),
        ConfidenceLevel::Low => format!(
            "This response has low confidence ({percent:.0}%). The answer may not be fully supported by the available context. Consider reviewing the sources."
        ),
        ConfidenceLevel::VeryLow => format!(
            "This response has very low confidence ({percent:.0}%). The answer should be verified against authoritative sources before use."
        ),
        _ => format!("Confidence: {percent:.0}%"),
    };

    match outcome.method {
        "model" => explanation.push_str(" (Evaluated using model-graded metrics)"),
        "heuristic" => explanation.push_str(" (Evaluated using response characteristics)"),
        _ => {}
    }

    explanation
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quorum_llm::{GeneratorReply, Message};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String, String>>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<String, String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate_with_context(&self, _messages: Vec<Message>) -> Result<GeneratorReply> {
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("script exhausted".to_string()));
            match next {
                Ok(content) => Ok(GeneratorReply {
                    content,
                    finish_reason: None,
                    usage: None,
                }),
                Err(e) => anyhow::bail!(e),
            }
        }
    }

    #[test]
    fn heuristic_scores_strong_response_high() {
        let answer = "a".repeat(300);
        let outcome = heuristic(&answer, 5, true, 1.0);

        // 1.0*0.30 + 1.0*0.25 + 0.9*0.20 + 0.9*0.25 = 0.955
        assert_eq!(outcome.confidence, Some(0.955));
        assert_eq!(outcome.level, ConfidenceLevel::High);
        assert_eq!(outcome.method, "heuristic");
    }

    #[test]
    fn heuristic_scores_weak_response_very_low() {
        let answer = "a".repeat(20);
        let outcome = heuristic(&answer, 0, false, 0.5);

        // 0.5*0.30 + 0.2*0.25 + 0.3*0.20 + 0.3*0.25 = 0.335
        assert_eq!(outcome.confidence, Some(0.335));
        assert_eq!(outcome.level, ConfidenceLevel::VeryLow);
    }

    #[test]
    fn heuristic_middle_band() {
        let answer = "a".repeat(150);
        let outcome = heuristic(&answer, 2, true, 0.8);

        // 0.8*0.30 + 0.7*0.25 + 0.9*0.20 + 0.7*0.25 = 0.77
        assert_eq!(outcome.confidence, Some(0.77));
        assert_eq!(outcome.level, ConfidenceLevel::Medium);
    }

    #[tokio::test]
    async fn model_assisted_averages_metrics_and_inverts_hallucination() {
        // hallucination 0.2 -> 0.8; relevance 1.0; precision 0.6; recall 0.6
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(r#"{"score": 0.2}"#.to_string()),
            Ok(r#"{"score": 1.0}"#.to_string()),
            Ok(r#"{"score": 0.6}"#.to_string()),
            Ok(r#"{"score": 0.6}"#.to_string()),
        ]));
        let evaluator = Evaluator::new(EvaluationStrategy::ModelAssisted, generator);

        let outcome = evaluator
            .evaluate("q", "a", &["ctx".to_string()], 1, 0.9)
            .await;

        assert_eq!(outcome.confidence, Some(0.75));
        assert_eq!(outcome.level, ConfidenceLevel::Medium);
        assert_eq!(outcome.method, "model");
    }

    #[tokio::test]
    async fn model_assisted_skips_failed_metrics() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err("timeout".to_string()),
            Ok(r#"```json
{"score": 0.9}
```"#
                .to_string()),
            Err("timeout".to_string()),
            Ok("gibberish".to_string()),
        ]));
        let evaluator = Evaluator::new(EvaluationStrategy::ModelAssisted, generator);

        let outcome = evaluator
            .evaluate("q", "a", &["ctx".to_string()], 1, 0.9)
            .await;

        assert_eq!(outcome.confidence, Some(0.9));
        assert_eq!(outcome.level, ConfidenceLevel::High);
    }

    #[tokio::test]
    async fn model_assisted_with_no_surviving_metric_is_unknown() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err("down".to_string()),
            Err("down".to_string()),
            Err("down".to_string()),
            Err("down".to_string()),
        ]));
        let evaluator = Evaluator::new(EvaluationStrategy::ModelAssisted, generator);

        let outcome = evaluator.evaluate("q", "a", &[], 0, 0.9).await;

        assert_eq!(outcome.confidence, None);
        assert_eq!(outcome.level, ConfidenceLevel::Unknown);
    }

    #[test]
    fn explanation_mentions_method() {
        let outcome = heuristic("some answer text", 3, true, 0.9);
        let explanation = confidence_explanation(&outcome);
        assert!(explanation.contains("response characteristics"));
    }

    #[test]
    fn explanation_without_score() {
        let outcome = EvaluationOutcome::unknown("model");
        assert_eq!(
            confidence_explanation(&outcome),
            "Unable to evaluate response confidence."
        );
    }
}
