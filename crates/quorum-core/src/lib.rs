mod config;
mod evaluator;
mod orchestrator;
mod service;
mod session;
mod splitter;
mod state;
mod synthesizer;

pub use config::EngineConfig;
pub use evaluator::{
    confidence_explanation, EvaluationOutcome, EvaluationStrategy, Evaluator,
};
pub use orchestrator::{Orchestrator, QueryOutcome};
pub use service::QueryService;
pub use session::{InMemorySessionStore, MessageRole, SessionStore, StoredMessage};
pub use splitter::{split_questions, Question};
pub use state::{merge_responses, OrchestrationState};
pub use synthesizer::{SynthesizedAnswer, Synthesizer, NO_RESPONSE_MESSAGE};
