use anyhow::{Context, Result};
use quorum_agents::ResponderResult;
use quorum_common::RetrievedFragment;
use quorum_llm::TextGenerator;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Exact message returned when no responder produced anything usable.
pub const NO_RESPONSE_MESSAGE: &str = "I apologize, but I couldn't generate a response.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are an expert at synthesizing information from multiple sources.
Your task is to combine the following responses from different specialized responders into a single,
coherent, and comprehensive answer to the user's question.

Guidelines:
1. Integrate information from all responders naturally, without adding facts of your own
2. Remove redundancies and deduplicate overlapping content
3. Preserve any explicit statements that information was not found
4. If the question had several parts, organize the answer by sub-question
5. Keep the tone professional and helpful";

/// One merged answer with the sources that back it.
#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    pub answer: String,
    pub sources: Vec<RetrievedFragment>,
    pub primary_responder: String,
}

/// Merges responder outputs into a single final answer.
pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Merge the results for one question. Zero results produce the fixed
    /// apology, a single result passes through unchanged, and several
    /// results are merged by the generator - or by deterministic
    /// concatenation when the generator fails.
    pub async fn synthesize(
        &self,
        question: &str,
        mut results: Vec<ResponderResult>,
    ) -> SynthesizedAnswer {
        if results.is_empty() {
            return SynthesizedAnswer {
                answer: NO_RESPONSE_MESSAGE.to_string(),
                sources: Vec::new(),
                primary_responder: "None".to_string(),
            };
        }

        if results.len() == 1 {
            let result = results.remove(0);
            return SynthesizedAnswer {
                answer: result.answer,
                sources: result.sources,
                primary_responder: result.responder.display_name().to_string(),
            };
        }

        info!("Synthesizing {} responder answers", results.len());

        let answer = match self.merge_with_generator(question, &results).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Error in answer synthesis: {}, falling back to concatenation", e);
                concat_answers(&results)
            }
        };

        let sources = results.into_iter().flat_map(|r| r.sources).collect();

        SynthesizedAnswer {
            answer,
            sources,
            primary_responder: "Multiple Responders".to_string(),
        }
    }

    async fn merge_with_generator(
        &self,
        question: &str,
        results: &[ResponderResult],
    ) -> Result<String> {
        let labeled: Vec<String> = results
            .iter()
            .map(|r| format!("**{}:**\n{}", r.responder.display_name(), r.answer))
            .collect();

        let user_prompt = format!(
            "User Question: {}\n\nResponder Answers:\n{}\n\nPlease provide a synthesized answer that combines the insights from all responders:",
            question,
            labeled.join("\n\n")
        );

        let reply = self
            .generator
            .generate(SYNTHESIS_SYSTEM_PROMPT, &user_prompt)
            .await
            .context("Synthesis generation call failed")?;

        let answer = reply.content.trim().to_string();
        if answer.is_empty() {
            anyhow::bail!("synthesis returned an empty answer");
        }
        Ok(answer)
    }

    /// Combine per-question answers from a multi-question batch into one
    /// markdown document: a bold header per question, separated by
    /// horizontal rules, with sources deduplicated across questions.
    pub fn combine_batch(mut per_question: Vec<(String, SynthesizedAnswer)>) -> SynthesizedAnswer {
        if per_question.is_empty() {
            return SynthesizedAnswer {
                answer: NO_RESPONSE_MESSAGE.to_string(),
                sources: Vec::new(),
                primary_responder: "None".to_string(),
            };
        }

        if per_question.len() == 1 {
            return per_question.remove(0).1;
        }

        let mut parts = Vec::with_capacity(per_question.len());
        let mut all_sources = Vec::new();
        let mut primaries: Vec<String> = Vec::new();

        for (question, synthesized) in per_question {
            let header = question.trim().trim_end_matches('?').trim();
            parts.push(format!("**{}:**\n\n{}", header, synthesized.answer.trim()));
            all_sources.extend(synthesized.sources);
            if !primaries.contains(&synthesized.primary_responder) {
                primaries.push(synthesized.primary_responder);
            }
        }

        let primary_responder = if primaries.len() == 1 {
            primaries.remove(0)
        } else {
            "Multiple Responders".to_string()
        };

        SynthesizedAnswer {
            answer: parts.join("\n\n---\n\n"),
            sources: dedup_sources(all_sources),
            primary_responder,
        }
    }
}

/// Deterministic last line of defense when the synthesis generator fails.
fn concat_answers(results: &[ResponderResult]) -> String {
    results
        .iter()
        .map(|r| format!("**{}:**\n{}", r.responder.display_name(), r.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deduplicate by identifier, falling back to a content prefix for
/// fragments without one. First occurrence wins; input order is otherwise
/// preserved even though callers never rely on it.
fn dedup_sources(sources: Vec<RetrievedFragment>) -> Vec<RetrievedFragment> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| seen.insert(s.dedup_key()))
        .collect()
}
