//! `agent` command: one-shot direct mode or a minimal interactive REPL.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::config::Config;

use super::common::create_agent;

/// Run direct mode: `-m` processes one message and prints the reply;
/// without it, a line-based REPL on stdin.
pub(crate) async fn cmd_agent(
    config_path: Option<std::path::PathBuf>,
    message: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => {
            // A missing default config file is fine for direct mode (env
            // vars may carry the keys); a malformed one is not.
            let path = Config::default_path();
            if path.exists() {
                Config::load_from(&path)?
            } else {
                // Defaults + env overrides + workspace expansion.
                Config::load_from_str("{}")?
            }
        }
    };

    let bus = Arc::new(MessageBus::new());
    let cancel = CancellationToken::new();
    let runtime = create_agent(&config, bus, &cancel, model.as_deref()).await?;

    if let Some(message) = message {
        let reply = runtime
            .agent
            .process_direct(&cancel, &message)
            .await
            .with_context(|| "agent turn failed")?;
        println!("{}", reply);
        cancel.cancel();
        runtime.shutdown().await;
        return Ok(());
    }

    println!("nanobot agent (model: {}). Ctrl-D to exit.", runtime.agent.model());
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match runtime.agent.process_direct(&cancel, line).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    cancel.cancel();
    runtime.shutdown().await;
    Ok(())
}
