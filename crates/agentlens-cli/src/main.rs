use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log filter, e.g. `AGENTLENS_LOG=debug`
const LOG_ENV: &str = "AGENTLENS_LOG";

#[derive(Parser)]
#[command(name = "agentlens", version, about = "AgentLens CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the collector is reachable
    Health {
        /// Override the configured server URL
        #[arg(long)]
        server_url: Option<String>,
    },
    /// Show the resolved configuration
    Config,
    /// Deliver a recorded LLM call (JSON) to the collector
    LogCall {
        /// Path to the call record
        file: PathBuf,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        /// Replace message content with [REDACTED]
        #[arg(long)]
        redact: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Health { server_url } => agentlens_core::cmd_health(server_url.as_deref()).await?,
        Command::Config => agentlens_core::cmd_config()?,
        Command::LogCall {
            file,
            session,
            agent,
            redact,
        } => agentlens_core::cmd_log_call(&file, session, agent, redact).await?,
    }
    Ok(())
}
