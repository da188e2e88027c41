use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of retrieved content with similarity score and source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedFragment {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub distance: Option<f32>,
}

impl RetrievedFragment {
    /// Key used when deduplicating fragments collected from multiple
    /// questions: the identifier when one exists, otherwise a prefix of
    /// the content.
    pub fn dedup_key(&self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => self.content.chars().take(80).collect(),
        }
    }
}

/// Categorical bucket derived from a continuous confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
    Unknown,
    Error,
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::VeryLow => "VERY_LOW",
            ConfidenceLevel::Unknown => "UNKNOWN",
            ConfidenceLevel::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Common error types
#[derive(thiserror::Error, Debug)]
pub enum QuorumError {
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, QuorumError>;
