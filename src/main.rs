use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use quorum_agents::{ResponderKind, ResponderRegistry};
use quorum_common::ConfidenceLevel;
use quorum_core::{
    confidence_explanation, EngineConfig, EvaluationOutcome, InMemorySessionStore, Orchestrator,
    QueryService,
};
use quorum_llm::{OpenAiGenerator, TextGenerator};
use quorum_retrieval::{FragmentStore, HttpFragmentStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quorum", about = "Multi-responder query orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one question through the full pipeline
    Ask {
        /// The question to answer
        question: String,
        /// Session identifier for the message log
        #[arg(long, default_value = "cli")]
        session: String,
        /// User identifier
        #[arg(long, default_value = "cli-user")]
        user: String,
    },
    /// List the configured responders
    Responders,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ask {
            question,
            session,
            user,
        } => ask(&question, &user, &session).await,
        Command::Responders => {
            list_responders();
            Ok(())
        }
    }
}

/// Composition root: every service is constructed exactly once here and
/// handed down explicitly. The generator and fragment store clients are the
/// only long-lived shared resources.
async fn ask(question: &str, user: &str, session: &str) -> Result<()> {
    let config = EngineConfig::from_env()?;
    let method = match config.evaluation {
        quorum_core::EvaluationStrategy::ModelAssisted => "model",
        quorum_core::EvaluationStrategy::Heuristic => "heuristic",
    };

    let generator: Arc<dyn TextGenerator> = Arc::new(OpenAiGenerator::new(config.generator)?);
    let store: Arc<dyn FragmentStore> = Arc::new(HttpFragmentStore::new(config.search_url));
    let registry = Arc::new(ResponderRegistry::new(store, generator.clone()));

    let orchestrator = Orchestrator::new(registry, generator, config.evaluation);
    let service = QueryService::new(orchestrator, Arc::new(InMemorySessionStore::new()));

    let outcome = service.process(question, user, session).await;

    println!();
    println!("{}", outcome.answer);
    println!();
    println!(
        "{} {}",
        "Answered by:".bold(),
        outcome.primary_responder.cyan()
    );
    println!(
        "{} {} {}",
        "Confidence:".bold(),
        paint_level(outcome.confidence_level),
        outcome
            .confidence
            .map(|c| format!("({:.0}%)", c * 100.0))
            .unwrap_or_default()
    );
    println!(
        "{}",
        confidence_explanation(&EvaluationOutcome {
            confidence: outcome.confidence,
            level: outcome.confidence_level,
            method,
            breakdown: None,
        })
        .dimmed()
    );
    println!(
        "{} {} sources | {} ms",
        "Backed by:".bold(),
        outcome.sources.len(),
        outcome.processing_time_ms
    );

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

fn paint_level(level: ConfidenceLevel) -> colored::ColoredString {
    match level {
        ConfidenceLevel::High => level.to_string().green(),
        ConfidenceLevel::Medium => level.to_string().yellow(),
        ConfidenceLevel::Low | ConfidenceLevel::VeryLow => level.to_string().red(),
        ConfidenceLevel::Unknown | ConfidenceLevel::Error => level.to_string().dimmed(),
    }
}

fn list_responders() {
    println!("{}", "Configured responders:".bold());
    for kind in ResponderKind::ALL {
        println!(
            "  {} {} - {} (category: {})",
            "*".cyan(),
            kind.display_name().bold(),
            kind.description(),
            kind.category().unwrap_or("all documents")
        );
    }
}
