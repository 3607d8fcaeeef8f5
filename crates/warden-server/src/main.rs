//! Warden - guardrail proxy for LLM prompts.
//!
//! Runs the HTTP API server that checks every prompt against the
//! two-tier guardrail before forwarding it to the completion model.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use warden_core::{GeminiJudge, GuardrailConfig, GuardrailEngine};
use warden_server::llm::GeminiCompletion;
use warden_server::{AppState, Server, ServerConfig};

/// Warden - guardrail proxy for LLM prompts
#[derive(Parser, Debug)]
#[command(name = "warden", version, about)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model used for completions
    #[arg(long, default_value = "gemini-flash-latest")]
    model: String,

    /// Model used for the semantic safety judge
    #[arg(long, default_value = "gemini-flash-lite-latest")]
    judge_model: String,
}

fn init_logging(args: &Args) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warden={},warn", args.log_level)));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let api_key =
        std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY environment variable not set")?;

    let config = GuardrailConfig::default();
    let judge = Arc::new(GeminiJudge::new(
        api_key.clone(),
        &args.judge_model,
        config.judge_timeout,
    ));
    let engine = Arc::new(GuardrailEngine::with_config(config, judge));
    let completion = Arc::new(GeminiCompletion::new(
        api_key,
        &args.model,
        Duration::from_secs(60),
    ));

    let state = AppState::new(engine, completion);
    let server_config = ServerConfig::default()
        .with_host(&args.host)
        .with_port(args.port);

    let server = Server::new(server_config, state)?;
    server.run().await?;

    Ok(())
}
