//! Cloud SQL Agent - Main entry point.
//!
//! Validates configuration, wires the Cloud SQL provider, the SQL tool and
//! the Gemini engine together, then hands the terminal to the session loop.

use clap::Parser;
use cloudsql_agent::config::Config;
use cloudsql_agent::db::CloudSqlProvider;
use cloudsql_agent::engine::GeminiEngine;
use cloudsql_agent::error::{AgentError, AgentResult};
use cloudsql_agent::repl::{ConsoleInput, SessionLoop, SessionState};
use cloudsql_agent::tools::SqlTool;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and only when asked for, so they never interleave with
/// the conversation on stdout.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: Config) -> AgentResult<()> {
    let credentials = Arc::new(config.credentials()?);
    let tunnel = config.tunnel_options()?;
    let gemini = config.gemini()?;

    info!(
        instance = %credentials.instance_ref,
        network = %credentials.network_mode,
        model = %gemini.model,
        "Starting Cloud SQL agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    let provider = Arc::new(CloudSqlProvider::new(credentials.clone(), tunnel)?);
    let tool = SqlTool::with_executor(provider, config.executor());
    let engine =
        GeminiEngine::new(gemini).map_err(|e| AgentError::configuration(e.to_string()))?;

    println!("Connected to: {}", credentials.instance_ref);
    println!("Type 'exit' or 'quit' to leave.");

    let input = ConsoleInput::new()?;
    let mut session = SessionLoop::new(
        engine,
        tool,
        SessionState::new(config.session_id.clone()),
        input,
        std::io::stdout(),
    );
    let reason = session.run().await?;
    info!(?reason, "Agent shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!(error = %e, "Agent failed");
        println!("Error: {}", e);
        if let Some(suggestion) = e.suggestion() {
            println!("  {}", suggestion);
        }
        std::process::exit(1);
    }
}
