//! SOCKS5 front-end for Remux
//!
//! Accepts local SOCKS5 clients, answers their CONNECT eagerly and hands
//! each resulting stream to the connection pool.

use crate::config::ClientConfig;
use crate::pool::PoolManager;
use crate::socks::dump_stream;
use crate::transport::{RemoteAddr, TcpTransport, Transport};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Run the front-end until shutdown
pub async fn run_client(config: ClientConfig, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let transport = Arc::new(TcpTransport::new(&config.transport)?);
    let manager = Arc::new(PoolManager::new(
        config.pool.clone(),
        transport,
        RemoteAddr::new(&config.remote_addr),
    ));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind SOCKS5 listener on {}", config.listen_addr))?;
    info!("SOCKS5 listener on {}", listener.local_addr()?);
    info!("Tunneling to {}", config.remote_addr);

    serve_socks(listener, manager, shutdown_rx).await
}

/// Accept SOCKS5 clients on an already bound listener
///
/// The pool is shut down when the shutdown signal arrives.
pub async fn serve_socks<T: Transport>(
    listener: TcpListener,
    manager: Arc<PoolManager<T>>,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, peer, manager).await {
                            warn!("SOCKS5 client {} failed: {:#}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept SOCKS5 client: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping SOCKS5 listener");
                break;
            }
        }
    }

    manager.log_health();
    manager.shutdown().await;
    Ok(())
}

async fn handle_client<T: Transport>(
    stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<PoolManager<T>>,
) -> Result<()> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set nodelay for {}: {}", peer, e);
    }

    let stream = match dump_stream(stream).await {
        Ok(stream) => stream,
        Err(e) if e.is_protocol() => {
            warn!("Rejected SOCKS5 handshake from {}: {}", peer, e);
            return Ok(());
        }
        Err(e) => return Err(e).context("SOCKS5 handshake failed"),
    };
    let target = stream.request().to_string();

    match manager.submit(stream).await {
        Ok(attachment) => {
            debug!(
                "{} -> {} on connection {} session {}",
                peer, target, attachment.connection, attachment.session
            );
            Ok(())
        }
        Err(rejected) => {
            let mut stream = rejected.stream;
            let _ = stream.shutdown().await;
            Err(rejected.error).with_context(|| format!("Failed to tunnel {} -> {}", peer, target))
        }
    }
}
