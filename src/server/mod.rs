//! Remote decoder for Remux
//!
//! Accepts tunnel connections from the front-end and serves the sessions
//! multiplexed on each one.

mod demux;

pub use demux::serve_tunnel;

use crate::config::ServerConfig;
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Run the remote decoder until shutdown
pub async fn run_server(config: ServerConfig, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind tunnel listener on {}", config.listen_addr))?;
    info!("Tunnel listener on {}", listener.local_addr()?);

    serve_tunnels(listener, config, shutdown_rx).await
}

/// Accept tunnel connections on an already bound listener
pub async fn serve_tunnels(
    listener: TcpListener,
    config: ServerConfig,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> Result<()> {
    let socket_opts = SocketOpts::from_tcp_config(&config.tcp);
    let connect_timeout = config.connect_timeout();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = socket_opts.apply(&stream) {
                        debug!("Failed to apply socket options for {}: {}", peer, e);
                    }
                    info!("Tunnel connection from {}", peer);
                    tokio::spawn(async move {
                        match serve_tunnel(stream, connect_timeout).await {
                            Ok(()) => debug!("Tunnel connection from {} closed", peer),
                            Err(e) => error!("Tunnel connection from {} failed: {:#}", peer, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept tunnel connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping tunnel listener");
                break;
            }
        }
    }

    Ok(())
}
