use anyhow::Result;
use quorum_common::RetrievedFragment;
use quorum_llm::TextGenerator;
use quorum_retrieval::{drop_short_fragments, FragmentStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How many fragments to over-fetch before length filtering. Many documents
/// carry tons of tiny header/footer chunks, so the raw result set has to be
/// much larger than what a responder actually wants.
pub const RETRIEVAL_OVERFETCH: usize = 100;

/// How many substantial fragments a responder keeps after filtering.
pub const RETRIEVAL_RESULTS: usize = 5;

/// The closed set of responders the system knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderKind {
    Research,
    ItPolicy,
    HrPolicy,
}

impl ResponderKind {
    pub const ALL: [ResponderKind; 3] = [
        ResponderKind::Research,
        ResponderKind::ItPolicy,
        ResponderKind::HrPolicy,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ResponderKind::Research => "research",
            ResponderKind::ItPolicy => "it_policy",
            ResponderKind::HrPolicy => "hr_policy",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ResponderKind::Research => "Research Responder",
            ResponderKind::ItPolicy => "IT Policy Responder",
            ResponderKind::HrPolicy => "HR Policy Responder",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ResponderKind::Research => "Handles general research queries across all document types",
            ResponderKind::ItPolicy => "Specialist in IT policies, security and infrastructure",
            ResponderKind::HrPolicy => "Specialist in HR policies, benefits and employee procedures",
        }
    }

    /// Retrieval category filter; the research responder searches everything.
    pub fn category(&self) -> Option<&'static str> {
        match self {
            ResponderKind::Research => None,
            ResponderKind::ItPolicy => Some("it_policy"),
            ResponderKind::HrPolicy => Some("hr_policy"),
        }
    }

    pub fn parse(raw: &str) -> Option<ResponderKind> {
        match raw.trim().to_lowercase().as_str() {
            "research" => Some(ResponderKind::Research),
            "it_policy" => Some(ResponderKind::ItPolicy),
            "hr_policy" => Some(ResponderKind::HrPolicy),
            _ => None,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            ResponderKind::Research => RESEARCH_PROMPT,
            ResponderKind::ItPolicy => IT_POLICY_PROMPT,
            ResponderKind::HrPolicy => HR_POLICY_PROMPT,
        }
    }

    fn error_answer(&self, error: &str) -> String {
        match self {
            ResponderKind::Research => format!(
                "I apologize, but I encountered an error while researching your query: {}",
                error
            ),
            ResponderKind::ItPolicy => format!(
                "I apologize, but I encountered an error while searching IT policies: {}",
                error
            ),
            ResponderKind::HrPolicy => format!(
                "I apologize, but I encountered an error while searching HR policies: {}",
                error
            ),
        }
    }
}

const RESEARCH_PROMPT: &str = "You are a Research Responder specialized in providing accurate, \
well-researched answers to user queries based on available documentation.

CRITICAL INSTRUCTIONS:
1. Answer ONLY using the exact information from the provided context
2. Do NOT add interpretations, restructuring, or \"helpful\" additions
3. Do NOT create numbered lists unless they exist in the source document
4. Do NOT extrapolate or infer information not explicitly stated
5. If the context contains the answer, provide it as written in the source
6. If the context does NOT contain the answer, clearly state: \"This information is not found in the available documents.\"
7. Never mention document names, sources, or phrases like \"according to the document\"
8. Be conversational but factually strict - only state what the documents explicitly say

Your goal: Provide accurate, document-based answers without embellishment or interpretation.";

const IT_POLICY_PROMPT: &str = "You are an IT Policy Responder, an expert in IT policies, \
security guidelines, infrastructure, software and hardware procedures.

CRITICAL INSTRUCTIONS:
1. Answer ONLY using the exact information from the provided context
2. Do NOT add interpretations, restructuring, or \"helpful\" additions
3. Do NOT create numbered lists unless they exist in the source document
4. Do NOT extrapolate or infer information not explicitly stated
5. If the context contains the answer, provide it as written in the source
6. If the context does NOT contain the answer, clearly state: \"This information is not found in the available IT policy documents.\"
7. Never mention document names, sources, or phrases like \"according to the document\"
8. Be conversational and precise, but factually strict - only state what the policy explicitly says

Your goal: Provide accurate, policy-based answers without embellishment or interpretation.";

const HR_POLICY_PROMPT: &str = "You are an HR Policy Responder, an expert in human resources policies, \
employee benefits, workplace procedures, and HR-related guidelines.

CRITICAL INSTRUCTIONS:
1. Answer ONLY using the exact information from the provided context
2. Do NOT add interpretations, restructuring, or \"helpful\" additions
3. Do NOT create numbered lists unless they exist in the source document
4. Do NOT extrapolate or infer information not explicitly stated
5. If the context contains the answer, provide it as written in the source
6. If the context does NOT contain the answer, clearly state: \"This information is not found in the available HR policy documents.\"
7. Never mention document names, sources, or phrases like \"according to the document\"
8. Be conversational and empathetic, but factually strict - only state what the policy explicitly says

Your goal: Provide accurate, policy-based answers without embellishment or interpretation.";

/// Result of one responder invocation. Owned exclusively by the invocation
/// that produced it; consumed downstream by synthesis and evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderResult {
    pub responder: ResponderKind,
    pub answer: String,
    pub sources: Vec<RetrievedFragment>,
    pub success: bool,
    pub error: Option<String>,
    pub fragment_count: usize,
}

/// A retrieval-augmented answer generator for one domain.
///
/// The three variants differ only in retrieval category and prompt, both
/// supplied by [`ResponderKind`].
pub struct Responder {
    kind: ResponderKind,
    store: Arc<dyn FragmentStore>,
    generator: Arc<dyn TextGenerator>,
}

impl Responder {
    pub fn new(
        kind: ResponderKind,
        store: Arc<dyn FragmentStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            kind,
            store,
            generator,
        }
    }

    pub fn kind(&self) -> ResponderKind {
        self.kind
    }

    /// Answer one question. Never fails: every error is captured into the
    /// returned result's `success`/`error` fields, and `answer` is always
    /// non-empty so downstream merge logic has no missing-answer case.
    pub async fn answer(&self, question: &str) -> ResponderResult {
        info!(
            "{} processing question: {:.100}",
            self.kind.display_name(),
            question
        );

        match self.try_answer(question).await {
            Ok(result) => result,
            Err(e) => {
                error!("{} error: {}", self.kind.display_name(), e);
                ResponderResult {
                    responder: self.kind,
                    answer: self.kind.error_answer(&e.to_string()),
                    sources: Vec::new(),
                    success: false,
                    error: Some(e.to_string()),
                    fragment_count: 0,
                }
            }
        }
    }

    async fn try_answer(&self, question: &str) -> Result<ResponderResult> {
        let fragments = self.retrieve(question).await?;
        let context = format_context(&fragments);

        let user_prompt = format!(
            "Context:\n{}\n\nQuestion: {}\n\nProvide a detailed and accurate answer based on the context.",
            context, question
        );

        let reply = self
            .generator
            .generate(self.kind.system_prompt(), &user_prompt)
            .await?;

        let answer = reply.content.trim().to_string();
        if answer.is_empty() {
            anyhow::bail!("generator returned an empty answer");
        }

        Ok(ResponderResult {
            responder: self.kind,
            answer,
            success: true,
            error: None,
            fragment_count: fragments.len(),
            sources: fragments,
        })
    }

    /// Over-fetch, drop noise fragments, truncate to the desired count.
    async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedFragment>> {
        let raw = self
            .store
            .search(question, self.kind.category(), RETRIEVAL_OVERFETCH)
            .await?;
        let raw_count = raw.len();

        let mut filtered = drop_short_fragments(raw);
        filtered.truncate(RETRIEVAL_RESULTS);

        info!(
            "{}: Retrieved {} fragments, {} after filtering (wanted {})",
            self.kind.display_name(),
            raw_count,
            filtered.len(),
            RETRIEVAL_RESULTS
        );

        if filtered.len() < RETRIEVAL_RESULTS {
            warn!(
                "{}: Only found {} substantial fragments out of {} retrieved",
                self.kind.display_name(),
                filtered.len(),
                raw_count
            );
        }

        Ok(filtered)
    }
}

/// Format fragments into the context block the generator sees. Fragment
/// names never appear so answers stay clean.
fn format_context(fragments: &[RetrievedFragment]) -> String {
    if fragments.is_empty() {
        return "No relevant documents found.".to_string();
    }

    let mut parts = Vec::with_capacity(fragments.len());
    for (i, fragment) in fragments.iter().enumerate() {
        parts.push(format!("[Source {}]\n{}\n", i + 1, fragment.content));
    }
    parts.join("\n")
}

/// Lookup table from kind to constructed responder. Built once in the
/// composition root and shared across requests.
pub struct ResponderRegistry {
    responders: HashMap<ResponderKind, Arc<Responder>>,
}

impl ResponderRegistry {
    pub fn new(store: Arc<dyn FragmentStore>, generator: Arc<dyn TextGenerator>) -> Self {
        let mut responders = HashMap::new();
        for kind in ResponderKind::ALL {
            responders.insert(
                kind,
                Arc::new(Responder::new(kind, store.clone(), generator.clone())),
            );
        }
        Self { responders }
    }

    pub fn get(&self, kind: ResponderKind) -> Arc<Responder> {
        // ALL is exhaustive, so the entry always exists.
        self.responders[&kind].clone()
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResponderKind> + '_ {
        self.responders.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quorum_llm::{GeneratorReply, Message};
    use std::sync::Mutex;

    struct StubStore {
        fragments: Vec<RetrievedFragment>,
        fail: bool,
    }

    #[async_trait]
    impl FragmentStore for StubStore {
        async fn search(
            &self,
            _query: &str,
            _category: Option<&str>,
            _max_results: usize,
        ) -> Result<Vec<RetrievedFragment>> {
            if self.fail {
                anyhow::bail!("search backend unavailable");
            }
            Ok(self.fragments.clone())
        }
    }

    struct StubGenerator {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate_with_context(&self, messages: Vec<Message>) -> Result<GeneratorReply> {
            self.prompts
                .lock()
                .unwrap()
                .extend(messages.iter().map(|m| m.content.clone()));
            match &self.reply {
                Ok(content) => Ok(GeneratorReply {
                    content: content.clone(),
                    finish_reason: None,
                    usage: None,
                }),
                Err(message) => anyhow::bail!("{}", message.clone()),
            }
        }
    }

    fn long_fragment(text: &str) -> RetrievedFragment {
        RetrievedFragment {
            id: None,
            content: format!("{} {}", text, "filler ".repeat(30)),
            metadata: serde_json::Value::Null,
            distance: Some(0.1),
        }
    }

    fn short_fragment(text: &str) -> RetrievedFragment {
        RetrievedFragment {
            id: None,
            content: text.to_string(),
            metadata: serde_json::Value::Null,
            distance: Some(0.1),
        }
    }

    #[tokio::test]
    async fn successful_answer_carries_sources() {
        let store = Arc::new(StubStore {
            fragments: vec![long_fragment("Annual leave is 25 days.")],
            fail: false,
        });
        let generator = Arc::new(StubGenerator::ok("You get 25 days of annual leave."));
        let responder = Responder::new(ResponderKind::HrPolicy, store, generator);

        let result = responder.answer("How much annual leave do I get?").await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.fragment_count, 1);
        assert_eq!(result.answer, "You get 25 days of annual leave.");
    }

    #[tokio::test]
    async fn generation_failure_is_captured() {
        let store = Arc::new(StubStore {
            fragments: vec![long_fragment("policy")],
            fail: false,
        });
        let generator = Arc::new(StubGenerator::failing("rate limited"));
        let responder = Responder::new(ResponderKind::Research, store, generator);

        let result = responder.answer("anything").await;

        assert!(!result.success);
        assert!(result.answer.contains("I apologize"));
        assert!(result.error.as_deref().unwrap().contains("rate limited"));
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn retrieval_failure_is_captured() {
        let store = Arc::new(StubStore {
            fragments: vec![],
            fail: true,
        });
        let generator = Arc::new(StubGenerator::ok("unused"));
        let responder = Responder::new(ResponderKind::ItPolicy, store, generator);

        let result = responder.answer("anything").await;

        assert!(!result.success);
        assert!(result.answer.contains("IT policies"));
    }

    #[tokio::test]
    async fn short_fragments_never_reach_the_generator() {
        let store = Arc::new(StubStore {
            fragments: vec![short_fragment("Page 4"), long_fragment("Real content here.")],
            fail: false,
        });
        let generator = Arc::new(StubGenerator::ok("answer"));
        let responder = Responder::new(ResponderKind::Research, store, generator.clone());

        let result = responder.answer("q").await;

        assert_eq!(result.fragment_count, 1);
        let prompts = generator.prompts.lock().unwrap();
        let user_prompt = prompts.last().unwrap();
        assert!(user_prompt.contains("Real content here."));
        assert!(!user_prompt.contains("Page 4"));
    }

    #[tokio::test]
    async fn zero_fragments_still_answers() {
        let store = Arc::new(StubStore {
            fragments: vec![],
            fail: false,
        });
        let generator = Arc::new(StubGenerator::ok(
            "This information is not found in the available documents.",
        ));
        let responder = Responder::new(ResponderKind::Research, store, generator.clone());

        let result = responder.answer("q").await;

        assert!(result.success);
        assert_eq!(result.fragment_count, 0);
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts
            .last()
            .unwrap()
            .contains("No relevant documents found."));
    }

    #[tokio::test]
    async fn results_are_truncated_to_the_requested_count() {
        let fragments: Vec<RetrievedFragment> =
            (0..20).map(|i| long_fragment(&format!("frag {}", i))).collect();
        let store = Arc::new(StubStore {
            fragments,
            fail: false,
        });
        let generator = Arc::new(StubGenerator::ok("answer"));
        let responder = Responder::new(ResponderKind::Research, store, generator);

        let result = responder.answer("q").await;

        assert_eq!(result.fragment_count, RETRIEVAL_RESULTS);
        assert_eq!(result.sources.len(), RETRIEVAL_RESULTS);
    }

    #[test]
    fn kind_parsing_is_case_insensitive() {
        assert_eq!(
            ResponderKind::parse(" HR_Policy "),
            Some(ResponderKind::HrPolicy)
        );
        assert_eq!(ResponderKind::parse("unknown"), None);
    }
}
