//! Tunnel demultiplexer
//!
//! Splits one inbound tunnel connection back into sessions. Every new
//! session id gets an in-memory pipe; the session task reads the request
//! header from it, dials the target and relays in both directions.

use crate::pool::{read_frame, FrameWriter, SessionId};
use crate::socks::load_stream;
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Capacity of each session's inbound pipe; fits any single frame
const PIPE_CAPACITY: usize = 128 * 1024;

/// Read buffer size for target-to-tunnel forwarding
const RELAY_BUFFER_SIZE: usize = 16 * 1024;

type TunnelWriter<S> = Arc<FrameWriter<WriteHalf<S>>>;

/// Serve every session carried by one tunnel connection
///
/// Returns when the tunnel ends; open sessions see EOF on their pipes.
pub async fn serve_tunnel<S>(transport: S, connect_timeout: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(transport);
    let (closed_tx, mut closed_rx) = watch::channel(false);
    let closed_tx = Arc::new(closed_tx);
    let writer: TunnelWriter<S> = Arc::new(FrameWriter::new(writer, closed_rx.clone()));

    let mut pipes: HashMap<SessionId, DuplexStream> = HashMap::new();
    let mut seen: HashSet<SessionId> = HashSet::new();

    let result = loop {
        let frame = tokio::select! {
            result = read_frame(&mut reader) => match result {
                Ok(frame) => frame,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break Ok(()),
                Err(e) => break Err(anyhow::Error::new(e).context("Tunnel read failed")),
            },
            _ = closed_rx.wait_for(|closed| *closed) => break Ok(()),
        };
        let id = frame.session;

        if frame.is_close() {
            if let Some(mut pipe) = pipes.remove(&id) {
                trace!("Session {} closed by client side", id);
                let _ = pipe.shutdown().await;
            }
            continue;
        }

        if let Some(pipe) = pipes.get_mut(&id) {
            if pipe.write_all(&frame.payload).await.is_err() {
                // session task already gone
                pipes.remove(&id);
            }
            continue;
        }

        if !seen.insert(id) {
            trace!("Discarding {} bytes for ended session {}", frame.payload.len(), id);
            continue;
        }

        let (mut near, far) = tokio::io::duplex(PIPE_CAPACITY);
        if let Err(e) = near.write_all(&frame.payload).await {
            break Err(anyhow::Error::new(e).context("Session pipe write failed"));
        }
        pipes.insert(id, near);

        tokio::spawn(run_session(
            id,
            far,
            writer.clone(),
            closed_tx.clone(),
            connect_timeout,
        ));
    };

    closed_tx.send_replace(true);
    writer.shutdown().await;
    debug!("Tunnel ended with {} open sessions", pipes.len());
    result
}

/// Drive one session from header to final close frame
async fn run_session<S>(
    id: SessionId,
    pipe: DuplexStream,
    writer: TunnelWriter<S>,
    closed_tx: Arc<watch::Sender<bool>>,
    connect_timeout: Duration,
) where
    S: AsyncWrite + Unpin + Send,
{
    let stream = match load_stream(pipe).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Session {} sent an invalid request header: {}", id, e);
            send_close(id, &writer, &closed_tx).await;
            return;
        }
    };
    let request = stream.request().clone();

    let target = match connect_target(&request, connect_timeout).await {
        Ok(target) => target,
        Err(e) => {
            warn!("Session {} failed to reach {}: {:#}", id, request, e);
            send_close(id, &writer, &closed_tx).await;
            return;
        }
    };
    info!("Session {} connected to {}", id, request);

    let (mut target_read, mut target_write) = target.into_split();
    let mut inbound = stream;

    let upstream = async {
        if let Err(e) = tokio::io::copy(&mut inbound, &mut target_write).await {
            debug!("Session {} upstream ended: {}", id, e);
        }
        let _ = target_write.shutdown().await;
    };

    let downstream = async {
        let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
        loop {
            match target_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = writer.send_data(id, &buf[..n]).await {
                        debug!("Session {} tunnel write failed: {}", id, e);
                        closed_tx.send_replace(true);
                        return;
                    }
                }
                Err(e) => {
                    debug!("Session {} target read failed: {}", id, e);
                    break;
                }
            }
        }
        send_close(id, &writer, &closed_tx).await;
    };

    tokio::join!(upstream, downstream);
    debug!("Session {} to {} finished", id, request);
}

async fn connect_target(
    request: &crate::socks::SocksRequest,
    connect_timeout: Duration,
) -> Result<TcpStream> {
    let addr = request.resolve().await?;
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .with_context(|| format!("Connection timeout to {}", addr))?
        .with_context(|| format!("Failed to connect to {}", addr))?;

    if let Err(e) = SocketOpts::for_target().apply(&stream) {
        debug!("Failed to apply target socket options: {}", e);
    }
    Ok(stream)
}

async fn send_close<S>(id: SessionId, writer: &FrameWriter<WriteHalf<S>>, closed_tx: &watch::Sender<bool>)
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = writer.send_close(id).await {
        debug!("Session {} close frame not sent: {}", id, e);
        closed_tx.send_replace(true);
    }
}
