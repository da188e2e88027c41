use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod openai;

pub use openai::OpenAiGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Response from a text generation backend.
#[derive(Debug, Clone)]
pub struct GeneratorReply {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// Configuration for a generator client.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Trait for text generation backends. Every call is treated as slow and
/// potentially failing; callers are expected to degrade gracefully.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_with_context(&self, messages: Vec<Message>) -> Result<GeneratorReply>;

    /// Convenience wrapper for the common system + user prompt pair.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<GeneratorReply> {
        let messages = vec![
            Message {
                role: Role::System,
                content: system_prompt.to_string(),
            },
            Message {
                role: Role::User,
                content: user_prompt.to_string(),
            },
        ];
        self.generate_with_context(messages).await
    }
}

/// Strip the markdown code fences models like to wrap JSON responses in.
pub fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
