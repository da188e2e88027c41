use crate::ResponderKind;
use anyhow::{Context, Result};
use quorum_common::ConfidenceLevel;
use quorum_llm::{strip_code_fences, TextGenerator};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

const ROUTER_SYSTEM_PROMPT: &str = "You are a routing coordinator responsible for analyzing user \
questions and determining which specialist responder(s) should handle them.

Available responders:
1. it_policy - Handles IT policies, security, infrastructure, software, hardware, network, cybersecurity
2. hr_policy - Handles HR policies, benefits, leave, compensation, onboarding, performance reviews, workplace conduct
3. research - Handles general research questions that don't fit specific domains

Your task is to:
1. Analyze the user's question carefully
2. Determine which responder(s) are most appropriate (can be multiple for complex questions)
3. Provide a brief reasoning for your decision
4. Assign a confidence score (0-1) to your routing decision

Important:
- You can select MULTIPLE responders if the question spans multiple domains
- For questions clearly about one domain, select only that responder
- For ambiguous questions, default to the research responder
- Higher confidence (>0.8) for clear domain-specific questions
- Lower confidence (<0.5) for ambiguous questions

You MUST respond with a single JSON object ONLY, no extra commentary:
{
  \"responders\": [\"it_policy\", \"hr_policy\", \"research\"],
  \"reasoning\": \"brief explanation\",
  \"confidence\": 0.9
}";

const ROUTER_FALLBACK_PROMPT: &str = "You are a routing coordinator. Analyze the question and respond with:
RESPONDERS: [comma-separated list: it_policy, hr_policy, or research]
REASONING: [brief explanation]";

/// Which responders should answer a question, with rationale.
/// Always a non-empty, deduplicated subset of the known responder set.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub responders: Vec<ResponderKind>,
    pub reasoning: String,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
}

#[derive(Debug, Deserialize)]
struct RoutingReply {
    #[serde(default)]
    responders: Vec<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.8
}

/// Routes questions to the responders best placed to answer them.
pub struct Router {
    generator: Arc<dyn TextGenerator>,
}

impl Router {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Classify one question. Routing failures never reach the caller:
    /// parse attempts run in order (strict JSON, lenient plain text,
    /// static default) and the last one cannot fail.
    pub async fn route(&self, question: &str) -> RoutingDecision {
        let start = Instant::now();

        match self.route_structured(question).await {
            Ok(decision) => {
                info!(
                    "[ROUTING] {:?} | Confidence: {:.0}% ({}) | Latency: {}ms",
                    decision.responders.iter().map(|r| r.id()).collect::<Vec<_>>(),
                    decision.confidence * 100.0,
                    decision.confidence_level,
                    start.elapsed().as_millis()
                );
                return decision;
            }
            Err(e) => warn!("Structured routing failed: {}, attempting fallback parsing", e),
        }

        match self.route_lenient(question).await {
            Ok(decision) => {
                info!(
                    "[ROUTING FALLBACK] {:?} | Confidence: 50% (MEDIUM)",
                    decision.responders.iter().map(|r| r.id()).collect::<Vec<_>>()
                );
                decision
            }
            Err(e) => {
                error!("Routing fallback failed: {}", e);
                RoutingDecision {
                    responders: vec![ResponderKind::Research],
                    reasoning: "Routing failed, defaulting to the research responder".to_string(),
                    confidence: 0.3,
                    confidence_level: ConfidenceLevel::Low,
                }
            }
        }
    }

    async fn route_structured(&self, question: &str) -> Result<RoutingDecision> {
        let reply = self
            .generator
            .generate(ROUTER_SYSTEM_PROMPT, question)
            .await
            .context("Router generation call failed")?;

        let clean = strip_code_fences(&reply.content);
        let parsed: RoutingReply =
            serde_json::from_str(clean).context("Failed to parse routing JSON")?;

        let responders = validate_responders(&parsed.responders);
        let confidence = parsed.confidence.clamp(0.0, 1.0);

        Ok(RoutingDecision {
            responders,
            reasoning: parsed.reasoning,
            confidence,
            confidence_level: routing_band(confidence),
        })
    }

    async fn route_lenient(&self, question: &str) -> Result<RoutingDecision> {
        let reply = self
            .generator
            .generate(ROUTER_FALLBACK_PROMPT, question)
            .await
            .context("Router fallback generation call failed")?;

        let mut names: Vec<String> = Vec::new();
        let mut reasoning = "No reasoning provided".to_string();

        for line in reply.content.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("RESPONDERS:") {
                names = rest
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
            } else if let Some(rest) = line.strip_prefix("REASONING:") {
                reasoning = rest.trim().to_string();
            }
        }

        Ok(RoutingDecision {
            responders: validate_responders(&names),
            reasoning,
            confidence: 0.5,
            confidence_level: ConfidenceLevel::Medium,
        })
    }
}

/// Drop identifiers outside the known set, dedupe while preserving order,
/// and fall back to the research responder when nothing valid remains.
fn validate_responders(names: &[String]) -> Vec<ResponderKind> {
    let mut seen = HashSet::new();
    let mut kinds: Vec<ResponderKind> = names
        .iter()
        .filter_map(|name| ResponderKind::parse(name))
        .filter(|kind| seen.insert(*kind))
        .collect();

    if kinds.is_empty() {
        kinds.push(ResponderKind::Research);
    }
    kinds
}

/// Observability-only banding; routing never branches on this.
fn routing_band(confidence: f32) -> ConfidenceLevel {
    if confidence >= 0.8 {
        ConfidenceLevel::High
    } else if confidence >= 0.5 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
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

    #[tokio::test]
    async fn structured_routing_parses_and_validates() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(r#"```json
{"responders": ["hr_policy", "hr_policy", "nonsense"], "reasoning": "leave question", "confidence": 0.92}
```"#
            .to_string())]));
        let router = Router::new(generator);

        let decision = router.route("What is the leave policy?").await;

        assert_eq!(decision.responders, vec![ResponderKind::HrPolicy]);
        assert_eq!(decision.reasoning, "leave question");
        assert!((decision.confidence - 0.92).abs() < f32::EPSILON);
        assert_eq!(decision.confidence_level, ConfidenceLevel::High);
    }

    #[tokio::test]
    async fn all_invalid_identifiers_default_to_research() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
            r#"{"responders": ["finance", "legal"], "reasoning": "?", "confidence": 0.6}"#
                .to_string(),
        )]));
        let router = Router::new(generator);

        let decision = router.route("question").await;

        assert_eq!(decision.responders, vec![ResponderKind::Research]);
    }

    #[tokio::test]
    async fn lenient_parse_recovers_from_bad_json() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("not json at all".to_string()),
            Ok("RESPONDERS: IT_POLICY, research\nREASONING: spans both".to_string()),
        ]));
        let router = Router::new(generator);

        let decision = router.route("question").await;

        assert_eq!(
            decision.responders,
            vec![ResponderKind::ItPolicy, ResponderKind::Research]
        );
        assert_eq!(decision.reasoning, "spans both");
        assert!((decision.confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(decision.confidence_level, ConfidenceLevel::Medium);
    }

    #[tokio::test]
    async fn total_failure_yields_static_fallback() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err("backend down".to_string()),
            Err("backend still down".to_string()),
        ]));
        let router = Router::new(generator);

        let decision = router.route("question").await;

        assert_eq!(decision.responders, vec![ResponderKind::Research]);
        assert!((decision.confidence - 0.3).abs() < f32::EPSILON);
        assert_eq!(decision.confidence_level, ConfidenceLevel::Low);
        assert!(decision.reasoning.contains("Routing failed"));
    }

    #[test]
    fn confidence_banding() {
        assert_eq!(routing_band(0.8), ConfidenceLevel::High);
        assert_eq!(routing_band(0.5), ConfidenceLevel::Medium);
        assert_eq!(routing_band(0.49), ConfidenceLevel::Low);
    }
}
