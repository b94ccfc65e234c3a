//! Retro Pong Server
//!
//! Room directory and state relay for Retro Pong online matches.

use tracing::info;
use tracing_subscriber::EnvFilter;

use retro_pong::{GameServer, ServerConfig, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    info!("Retro Pong Server v{}", VERSION);
    info!(
        "Heartbeat every {:?}, lobby timeout {:?}, max {} connections",
        config.heartbeat_interval, config.lobby_timeout, config.max_connections
    );

    let server = GameServer::new(config);

    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
