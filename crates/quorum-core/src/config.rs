use crate::evaluator::EvaluationStrategy;
use anyhow::{Context, Result};
use quorum_llm::GeneratorConfig;

/// Engine configuration, read from the environment exactly once by the
/// composition root. Components never touch the environment themselves.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub generator: GeneratorConfig,
    pub search_url: String,
    pub evaluation: EvaluationStrategy,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let mut generator = GeneratorConfig {
            api_key,
            ..Default::default()
        };
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            generator.base_url = base_url;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            generator.model = model;
        }
        if let Ok(temperature) = std::env::var("OPENAI_TEMPERATURE") {
            generator.temperature = temperature
                .parse()
                .context("OPENAI_TEMPERATURE must be a number")?;
        }
        if let Ok(max_tokens) = std::env::var("OPENAI_MAX_TOKENS") {
            generator.max_tokens = max_tokens
                .parse()
                .context("OPENAI_MAX_TOKENS must be an integer")?;
        }

        let search_url = std::env::var("QUORUM_SEARCH_URL")
            .unwrap_or_else(|_| "http://localhost:8100".to_string());

        let evaluation = match std::env::var("QUORUM_EVALUATION").as_deref() {
            Ok("model") => EvaluationStrategy::ModelAssisted,
            Ok("heuristic") | Err(_) => EvaluationStrategy::Heuristic,
            Ok(other) => {
                anyhow::bail!("QUORUM_EVALUATION must be 'model' or 'heuristic', got '{other}'")
            }
        };

        Ok(Self {
            generator,
            search_url,
            evaluation,
        })
    }
}
