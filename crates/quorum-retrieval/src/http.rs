use crate::FragmentStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use quorum_common::RetrievedFragment;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RetrievedFragment>,
}

/// Client for a semantic search service exposing a single `/search`
/// endpoint over the document embeddings.
pub struct HttpFragmentStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFragmentStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl FragmentStore for HttpFragmentStore {
    async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedFragment>> {
        let url = format!("{}/search", self.base_url);
        debug!("Searching fragments: '{}' (category: {:?})", query, category);

        let request = SearchRequest {
            query,
            category,
            limit: max_results,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach fragment search service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Fragment search error ({}): {}", status, body);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse fragment search response")?;

        info!(
            "Fragment search for '{}' returned {} results",
            query,
            parsed.results.len()
        );

        Ok(parsed.results)
    }
}
