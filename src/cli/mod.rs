//! CLI module — command parsing and dispatch. `main.rs` calls `cli::run()`.

mod agent;
pub mod common;
mod gateway;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nanobot")]
#[command(about = "Data-driven conversational agent framework", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent in direct mode
    Agent {
        /// Message to process one-shot (omits the REPL)
        #[arg(short, long)]
        message: Option<String>,
        /// Model override
        #[arg(long)]
        model: Option<String>,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Start the multi-channel gateway
    Gateway {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show configuration status
    Status {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show version information
    Version,
}

/// Entry point for the CLI.
pub async fn run() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Agent {
            message,
            model,
            config,
        }) => {
            agent::cmd_agent(config, message, model).await?;
        }
        Some(Commands::Gateway { config }) => {
            gateway::cmd_gateway(config).await?;
        }
        Some(Commands::Status { config }) => {
            status::cmd_status(config).await?;
        }
        Some(Commands::Version) | None => {
            println!("nanobot {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
