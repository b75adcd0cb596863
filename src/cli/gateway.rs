//! `gateway` command: start all configured channels and run the bus
//! dispatcher until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{InboundMessage, MessageBus};
use crate::channels::{register_configured_channels, ChannelManager};
use crate::config::Config;
use crate::heartbeat::HeartbeatService;

use super::common::create_agent;

pub(crate) async fn cmd_gateway(config_path: Option<std::path::PathBuf>) -> Result<()> {
    println!("Starting nanobot gateway...");

    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load().with_context(|| "Failed to load configuration")?,
    };

    let bus = Arc::new(MessageBus::new());
    let cancel = CancellationToken::new();

    let runtime = create_agent(&config, Arc::clone(&bus), &cancel, None).await?;

    // Channels.
    let channel_manager = ChannelManager::new(Arc::clone(&bus));
    let channel_count =
        register_configured_channels(&channel_manager, Arc::clone(&bus), &config).await;
    if channel_count == 0 {
        warn!(
            "No channels configured; the agent loop runs but receives nothing external. \
             Enable channels in {:?}",
            Config::default_path()
        );
    } else {
        info!(channels = channel_count, "Registered channels");
    }
    channel_manager
        .start_all(cancel.clone())
        .await
        .with_context(|| "Failed to start channels")?;

    // Outbound dispatcher (exactly one per process).
    let dispatcher = {
        let bus = Arc::clone(&bus);
        let cancel = cancel.clone();
        tokio::spawn(async move { bus.dispatch_outbound(&cancel).await })
    };

    // Heartbeat: decisions re-enter as synthetic inbound messages with a
    // dedicated channel name, never re-reading HEARTBEAT.md from the turn.
    let heartbeat = {
        let provider =
            super::common::resolve_provider(&config, &config.agents.defaults.model)?;
        let heartbeat_bus = Arc::clone(&bus);
        let service = Arc::new(HeartbeatService::new(
            provider,
            &config.agents.defaults.model,
            config.workspace_path(),
            config.agents.defaults.heartbeat_interval_secs,
            Arc::new(move |message: String| {
                let bus = Arc::clone(&heartbeat_bus);
                tokio::spawn(async move {
                    let inbound = InboundMessage::new("system", "heartbeat", "heartbeat", &message)
                        .with_metadata("source", "heartbeat");
                    if let Err(e) = bus.publish_inbound(inbound).await {
                        error!(error = %e, "Failed to publish heartbeat message");
                    }
                });
            }),
        ));
        service.start(cancel.clone()).await;
        service
    };

    // Agent loop.
    let agent_handle = {
        let agent = Arc::clone(&runtime.agent);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = agent.run(cancel).await {
                error!(error = %e, "Agent loop error");
            }
        })
    };

    println!();
    println!("Gateway is running. Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "Failed to listen for Ctrl+C")?;

    println!();
    println!("Shutting down...");

    cancel.cancel();
    heartbeat.stop().await;
    channel_manager.stop_all().await.ok();
    runtime.shutdown().await;

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), agent_handle).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), dispatcher).await;

    println!("Gateway stopped.");
    Ok(())
}
