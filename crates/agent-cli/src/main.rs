//! calc-agent
//!
//! Interactive terminal session with a tool-using AI agent. Questions are read
//! from stdin one line at a time; answers are typed to stdout as they stream
//! in. Logs go to stderr so they never interleave with an answer.

mod config;

use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{AgentBuilder, CalculatorTool, ExitReason, SessionDriver, ToolRegistry};

use crate::config::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment before parsing so `.env` can supply flag defaults
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Initialize LLM provider
    let provider = cli.build_provider()?;
    let info = provider.info();
    match provider.health_check().await {
        Ok(true) => tracing::info!(provider = %info.name, "Model endpoint reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!(provider = %info.name, "Model endpoint not reachable, questions may fail");
        }
    }

    // Initialize tools
    let mut tools = ToolRegistry::new();
    tools.register(CalculatorTool)?;
    tracing::info!(tools = ?tools.names(), "Registered tools");

    let agent = AgentBuilder::new()
        .provider(provider)
        .tools(tools)
        .config(cli.agent_config())
        .build()?;
    tracing::info!(
        model = %agent.config().generation.model,
        stream = agent.config().stream,
        "Agent ready"
    );

    let mut driver = SessionDriver::new(
        agent,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );
    let outcome = driver.run().await?;

    Ok(if outcome.reason == ExitReason::Fatal {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
