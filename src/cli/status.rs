//! `status` command: print the active model, workspace, and per-channel
//! enabled flags.

use anyhow::Result;

use crate::config::Config;

pub(crate) async fn cmd_status(config_path: Option<std::path::PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    println!("nanobot {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Model:      {}", config.agents.defaults.model);
    println!("Workspace:  {}", config.agents.defaults.workspace);
    println!();
    println!("Channels:");
    match &config.channels.telegram {
        Some(telegram) => println!("  telegram: enabled={}", telegram.enabled),
        None => println!("  telegram: not configured"),
    }
    if !config.mcp.is_empty() {
        println!();
        println!("MCP servers:");
        let mut names: Vec<&String> = config.mcp.keys().collect();
        names.sort();
        for name in names {
            println!("  {}", name);
        }
    }

    Ok(())
}
