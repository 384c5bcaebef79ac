//! Pooled tunnel connection
//!
//! A pooled connection carries up to `max_sessions_per_connection` sessions
//! over one transport stream. Each session gets a forwarding task that frames
//! client bytes onto the tunnel; a single dispatch task routes inbound frames
//! back to the sessions by id.

use super::frame::{read_frame, FrameWriter, SessionId};
use super::session::{ClientStream, Session};
use crate::config::PoolConfig;
use crate::transport::StreamDyn;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

/// Pool-wide connection serial number
pub type ConnectionId = u64;

/// Read buffer size for client-to-tunnel forwarding
const FORWARD_BUFFER_SIZE: usize = 16 * 1024;

/// Highest session id the 1-byte frame tag can carry
const MAX_SESSION_ID: u16 = SessionId::MAX as u16;

#[derive(Debug, Default)]
struct ConnState {
    /// Sessions ever attached; the next id is `opened + 1`
    opened: u16,
    /// Live sessions by id
    sessions: HashMap<SessionId, Arc<Session>>,
    closed: bool,
}

/// A tunnel connection shared by many sessions
#[derive(Debug)]
pub struct PooledConnection<S> {
    id: ConnectionId,
    created_at: Instant,
    max_sessions: u16,
    max_age: Duration,
    state: Mutex<ConnState>,
    writer: FrameWriter<WriteHalf<S>>,
    closed_tx: watch::Sender<bool>,
    retired: AtomicBool,
}

impl<S> PooledConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a freshly dialed transport stream and start its dispatch task
    ///
    /// A session limit above 255 is clamped so ids never wrap.
    pub fn new(id: ConnectionId, transport: S, config: &PoolConfig) -> Arc<Self> {
        Self::with_created_at(id, transport, config, Instant::now())
    }

    pub(crate) fn with_created_at(
        id: ConnectionId,
        transport: S,
        config: &PoolConfig,
        created_at: Instant,
    ) -> Arc<Self> {
        let (reader, writer) = tokio::io::split(transport);
        let (closed_tx, closed_rx) = watch::channel(false);

        let conn = Arc::new(PooledConnection {
            id,
            created_at,
            max_sessions: config.max_sessions_per_connection.min(MAX_SESSION_ID),
            max_age: config.max_age(),
            state: Mutex::new(ConnState::default()),
            writer: FrameWriter::new(writer, closed_rx.clone()),
            closed_tx,
            retired: AtomicBool::new(false),
        });

        debug!("Pooled connection {} opened", id);
        tokio::spawn(conn.clone().run_dispatch(reader, closed_rx));
        conn
    }

    /// Connection serial number
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Creation time
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    fn eligible(&self, state: &ConnState, now: Instant) -> bool {
        !state.closed
            && state.opened < self.max_sessions
            && now.saturating_duration_since(self.created_at) < self.max_age
    }

    /// Whether the connection would accept a new session at `now`
    pub async fn is_eligible_at(&self, now: Instant) -> bool {
        let state = self.state.lock().await;
        self.eligible(&state, now)
    }

    /// Attach a client stream as a new session
    ///
    /// Gives the stream back untouched if the connection is not eligible.
    pub async fn attach<C>(self: &Arc<Self>, stream: C) -> Result<SessionId, C>
    where
        C: StreamDyn + 'static,
    {
        self.try_attach_at(stream, Instant::now()).await
    }

    /// Attach a client stream, judging eligibility at `now`
    pub async fn try_attach_at<C>(self: &Arc<Self>, stream: C, now: Instant) -> Result<SessionId, C>
    where
        C: StreamDyn + 'static,
    {
        let mut state = self.state.lock().await;
        if !self.eligible(&state, now) {
            return Err(stream);
        }

        state.opened += 1;
        let id = state.opened as SessionId;

        let (reader, writer) = tokio::io::split(Box::new(stream) as ClientStream);
        let session = Arc::new(Session::new(id, writer));
        state.sessions.insert(id, session.clone());

        tokio::spawn(self.clone().run_forward(session, reader));
        drop(state);

        trace!("Session {} attached to connection {}", id, self.id);
        Ok(id)
    }

    /// Client-to-tunnel direction of one session
    async fn run_forward(self: Arc<Self>, session: Arc<Session>, mut reader: ReadHalf<ClientStream>) {
        let id = session.id();
        let mut session_closed = session.subscribe();
        let mut buf = vec![0u8; FORWARD_BUFFER_SIZE];
        let mut failed = false;

        loop {
            let n = tokio::select! {
                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        trace!("Session {} client EOF", id);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        debug!("Session {} client read failed: {}", id, e);
                        failed = true;
                        break;
                    }
                },
                _ = session_closed.wait_for(|closed| *closed) => break,
            };

            if let Err(e) = self.writer.send_data(id, &buf[..n]).await {
                if !self.is_closed() {
                    debug!("Connection {} tunnel write failed: {}", self.id, e);
                    self.close().await;
                }
                return;
            }
        }

        if self.is_closed() {
            return;
        }
        if let Err(e) = self.writer.send_close(id).await {
            debug!("Connection {} tunnel write failed: {}", self.id, e);
            self.close().await;
            return;
        }

        // EOF only half-closes; a read error ends the session here
        if failed {
            self.remove_session(id).await;
        }
    }

    /// Tunnel-to-client direction for every session
    async fn run_dispatch(self: Arc<Self>, mut reader: ReadHalf<S>, mut closed: watch::Receiver<bool>) {
        loop {
            let frame = tokio::select! {
                result = read_frame(&mut reader) => match result {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!("Connection {} tunnel read ended: {}", self.id, e);
                        break;
                    }
                },
                _ = closed.wait_for(|closed| *closed) => break,
            };

            if frame.is_close() {
                trace!("Remote closed session {} on connection {}", frame.session, self.id);
                self.remove_session(frame.session).await;
                continue;
            }

            let session = self.state.lock().await.sessions.get(&frame.session).cloned();
            match session {
                Some(session) => {
                    if let Err(e) = session.write(&frame.payload).await {
                        debug!("Session {} client write failed: {}", frame.session, e);
                        self.remove_session(frame.session).await;
                    }
                }
                None => trace!(
                    "Discarding {} bytes for unknown session {} on connection {}",
                    frame.payload.len(),
                    frame.session,
                    self.id
                ),
            }
        }

        self.close().await;
    }

    /// Drop a session from the map and close it
    async fn remove_session(&self, id: SessionId) {
        let (session, idle) = {
            let mut state = self.state.lock().await;
            let session = state.sessions.remove(&id);
            (session, state.sessions.is_empty())
        };

        if let Some(session) = session {
            session.close().await;
            if idle && self.is_retired() {
                debug!("Retired connection {} has no sessions left", self.id);
                self.close().await;
            }
        }
    }

    /// Stop offering this connection; it closes once its last session ends
    pub async fn retire(&self) {
        if self.retired.swap(true, Ordering::SeqCst) {
            return;
        }
        trace!("Connection {} retired", self.id);

        let idle = self.state.lock().await.sessions.is_empty();
        if idle {
            self.close().await;
        }
    }

    /// Whether the connection has been retired
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Close the connection and every live session
    ///
    /// Idempotent. The tunnel stream is shut down and both tasks stop.
    pub async fn close(&self) {
        let sessions = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.sessions)
        };

        self.closed_tx.send_replace(true);
        for session in sessions.into_values() {
            session.close().await;
        }
        self.writer.shutdown().await;

        debug!("Pooled connection {} closed", self.id);
    }

    /// Whether the connection has been closed
    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Number of sessions still mapped
    pub async fn live_sessions(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Number of sessions attached over the connection's lifetime
    pub async fn opened_sessions(&self) -> u16 {
        self.state.lock().await.opened
    }
}
