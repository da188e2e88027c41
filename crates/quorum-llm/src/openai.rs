use crate::{GeneratorConfig, GeneratorReply, Message, Role, TextGenerator, Usage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Chat-completions client for OpenAI-compatible backends.
///
/// Shared by every in-flight request; `reqwest::Client` is already safe for
/// concurrent use, so one instance lives in the composition root.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    base_delay: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("generator API key is required");
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        Self::new(GeneratorConfig {
            api_key,
            ..Default::default()
        })
    }

    fn generate_jitter(&self) -> Duration {
        // Time-seeded jitter keeps the client Send without an RNG crate.
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Duration::from_millis(now.as_nanos() as u64 % 500)
    }

    async fn call_api(&self, messages: Vec<Message>) -> Result<GeneratorReply> {
        let url = format!("{}/chat/completions", self.base_url);

        let wire_messages: Vec<serde_json::Value> = messages
            .into_iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({
                    "role": role,
                    "content": msg.content
                })
            })
            .collect();

        let request_body = json!({
            "model": self.model,
            "messages": wire_messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let mut attempt = 0;

        while attempt <= self.max_retries {
            let start_time = Instant::now();

            match self.perform_api_call(&url, &request_body).await {
                Ok(reply) => {
                    debug!(
                        "Generator call succeeded on attempt {} (took {:?})",
                        attempt + 1,
                        start_time.elapsed()
                    );
                    return Ok(reply);
                }
                Err(e) => {
                    attempt += 1;
                    warn!("Generator call failed on attempt {}: {}", attempt, e);

                    if attempt > self.max_retries {
                        error!("All {} retry attempts failed for generator", self.max_retries);
                        return Err(e);
                    }

                    // Exponential backoff: base_delay * 2^(attempt-1), plus jitter
                    let backoff_delay = self.base_delay * 2u32.pow(attempt - 1);
                    let total_delay = backoff_delay + self.generate_jitter();

                    warn!(
                        "Retrying in {:?} (attempt {}/{})",
                        total_delay, attempt, self.max_retries
                    );
                    sleep(total_delay).await;
                }
            }
        }

        anyhow::bail!("Unexpected error after retries")
    }

    async fn perform_api_call(
        &self,
        url: &str,
        request_body: &serde_json::Value,
    ) -> Result<GeneratorReply> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request_body)
            .send()
            .await
            .context("Failed to send request to generator backend")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                anyhow::bail!("Generator server error ({}): {}", status, error_text);
            } else {
                anyhow::bail!("Generator error ({}): {}", status, error_text);
            }
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse generator response")?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .context("Failed to extract text from generator response")?
            .to_string();

        let usage = response_json["usage"].as_object().map(|u| Usage {
            prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as usize,
            completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as usize,
            total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as usize,
        });

        Ok(GeneratorReply {
            content,
            finish_reason: response_json["choices"][0]["finish_reason"]
                .as_str()
                .map(|s| s.to_string()),
            usage,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate_with_context(&self, messages: Vec<Message>) -> Result<GeneratorReply> {
        info!("Generating response with {}", self.model);
        self.call_api(messages).await
    }
}
