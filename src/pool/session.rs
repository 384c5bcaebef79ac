//! One SOCKS5 client stream attached to a pooled connection

use super::frame::SessionId;
use crate::transport::StreamDyn;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::trace;

/// Boxed client stream carried by a session
pub(crate) type ClientStream = Box<dyn StreamDyn>;

/// A multiplexed session
///
/// Owns the write side of its client stream. The read side is driven by the
/// connection's forwarding task, which watches [`Session::subscribe`] to stop.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    writer: Mutex<WriteHalf<ClientStream>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl Session {
    pub(crate) fn new(id: SessionId, writer: WriteHalf<ClientStream>) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Session {
            id,
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
            closed_tx,
        }
    }

    /// Session id on its connection
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Subscribe to the close signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Deliver payload to the client
    pub async fn write(&self, payload: &[u8]) -> io::Result<()> {
        let mut closed = self.subscribe();
        if *closed.borrow() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed"));
        }

        let mut writer = self.writer.lock().await;
        tokio::select! {
            result = async {
                writer.write_all(payload).await?;
                writer.flush().await
            } => result,
            _ = closed.wait_for(|closed| *closed) => {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "session closed"))
            }
        }
    }

    /// Close the session
    ///
    /// Only the first call does anything; it returns `true`. The client
    /// stream's write side is shut down exactly once.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed_tx.send_replace(true);

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            trace!("Session {} client shutdown failed: {}", self.id, e);
        }
        trace!("Session {} closed", self.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt};

    fn session_pair(id: SessionId) -> (Session, tokio::io::DuplexStream) {
        let (near, far) = duplex(1024);
        let (_reader, writer) = tokio::io::split(Box::new(near) as ClientStream);
        (Session::new(id, writer), far)
    }

    #[tokio::test]
    async fn test_session_write_reaches_client() {
        let (session, mut client) = session_pair(1);
        session.write(b"pong").await.unwrap();

        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_session_close_once() {
        let (session, mut client) = session_pair(2);
        let session = Arc::new(session);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.close().await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(session.is_closed());

        // client sees EOF
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_session_write_after_close_fails() {
        let (session, _client) = session_pair(3);
        let mut signal = session.subscribe();

        session.close().await;
        assert!(*signal.borrow_and_update());
        assert_eq!(
            session.write(b"late").await.unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }
}
