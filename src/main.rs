//! RoomLink Server
//!
//! Accepts WebSocket clients, keeps room membership and relays network
//! objects between the members of each room.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomlink::{
    config::{ServerArgs, ServerConfig},
    RoomServer, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();
    let config = ServerConfig::load(&args).context("loading server configuration")?;

    info!("RoomLink Server v{}", VERSION);
    info!("Tick Rate: {} Hz", config.tick_rate);
    info!("Max Connections: {}", config.max_connections);

    let mut server = RoomServer::bind(&config)
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shutdown.shutdown();
        }
    });

    server.run(config.tick_rate).await;
    info!("Server stopped after {} ticks", server.ticks());
    Ok(())
}
