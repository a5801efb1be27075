//! Standalone call-session relay server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxline_core::adapters::ws::server::RelayServer;
use voxline_core::application::relay::RoutingPolicy;
use voxline_core::config::RelayConfig;

/// WebSocket relay for browser voice calls: audio fan-out plus call signaling.
#[derive(Debug, Parser)]
#[command(name = "voxline-server", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "VOXLINE_BIND", default_value = "0.0.0.0:9098")]
    bind: SocketAddr,

    /// Audio routing: "broadcast" (every other peer) or "session" (active
    /// call counterpart only).
    #[arg(long, env = "VOXLINE_ROUTING", default_value_t = RoutingPolicy::Broadcast)]
    routing: RoutingPolicy,

    /// Frames queued per audio recipient before the oldest is dropped.
    #[arg(long, env = "VOXLINE_QUEUE_CAPACITY", default_value_t = 32)]
    queue_capacity: usize,

    /// Envelopes queued per signaling recipient.
    #[arg(long, env = "VOXLINE_SIGNAL_QUEUE_CAPACITY", default_value_t = 64)]
    signal_queue_capacity: usize,

    /// Seconds between server pings.
    #[arg(long, env = "VOXLINE_HEARTBEAT_SECS", default_value_t = 15)]
    heartbeat_secs: u64,

    /// Seconds of silence before a connection is dropped.
    #[arg(long, env = "VOXLINE_IDLE_TIMEOUT_SECS", default_value_t = 45)]
    idle_timeout_secs: u64,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind,
            routing: args.routing,
            audio_queue_capacity: args.queue_capacity,
            signal_queue_capacity: args.signal_queue_capacity,
            heartbeat_interval: Duration::from_secs(args.heartbeat_secs),
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RelayConfig::from(Args::parse());
    info!(bind = %config.bind_addr, routing = %config.routing, "Relay server starting");

    let server = Arc::new(RelayServer::bind(config).await?);
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Relay server stopped");
    Ok(())
}
