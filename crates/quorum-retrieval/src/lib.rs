use anyhow::Result;
use async_trait::async_trait;
use quorum_common::RetrievedFragment;

mod http;

pub use http::HttpFragmentStore;

/// Fragments shorter than this are page headers, footers and other noise;
/// they are never surfaced to a responder.
pub const MIN_FRAGMENT_CHARS: usize = 100;

/// Trait for vector similarity search backends.
///
/// Implementations must be safe for concurrent calls; a single instance is
/// shared by every in-flight fan-out. Results are most-similar-first within
/// one call, nothing more.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedFragment>>;
}

/// Drop fragments whose trimmed content is below [`MIN_FRAGMENT_CHARS`].
pub fn drop_short_fragments(fragments: Vec<RetrievedFragment>) -> Vec<RetrievedFragment> {
    fragments
        .into_iter()
        .filter(|f| f.content.trim().chars().count() >= MIN_FRAGMENT_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(content: &str) -> RetrievedFragment {
        RetrievedFragment {
            id: None,
            content: content.to_string(),
            metadata: serde_json::Value::Null,
            distance: Some(0.1),
        }
    }

    #[test]
    fn short_fragments_are_dropped() {
        let fragments = vec![
            fragment("Page 3"),
            fragment(&"policy text ".repeat(20)),
            fragment("   \n  "),
        ];

        let kept = drop_short_fragments(fragments);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].content.starts_with("policy text"));
    }

    #[test]
    fn boundary_length_is_kept() {
        let exact = "a".repeat(MIN_FRAGMENT_CHARS);
        let kept = drop_short_fragments(vec![fragment(&exact)]);
        assert_eq!(kept.len(), 1);
    }
}
