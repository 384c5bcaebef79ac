//! Tunnel frame codec
//!
//! Every frame on a pooled connection carries one session's bytes:
//!
//! ```text
//! +------------+--------+-----------+
//! | SESSION ID | LENGTH |  PAYLOAD  |
//! +------------+--------+-----------+
//! |     1      | 2 (BE) |  LENGTH   |
//! +------------+--------+-----------+
//! ```
//!
//! A zero-length payload closes the session. Both ends of the tunnel share
//! this module.

use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::trace;

/// Connection-local session identifier
pub type SessionId = u8;

/// Frame header size: id(1) + length(2)
pub const FRAME_HEADER_LEN: usize = 3;

/// Largest payload a single frame can carry
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// A single tunnel frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Owning session
    pub session: SessionId,
    /// Payload; empty for a close signal
    pub payload: Bytes,
}

impl Frame {
    /// Create a data frame
    pub fn data(session: SessionId, payload: Bytes) -> Self {
        debug_assert!(!payload.is_empty() && payload.len() <= MAX_FRAME_PAYLOAD);
        Frame { session, payload }
    }

    /// Create a close frame
    pub fn close(session: SessionId) -> Self {
        Frame {
            session,
            payload: Bytes::new(),
        }
    }

    /// Whether this frame closes its session
    pub fn is_close(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode the frame into bytes for transmission
    pub fn encode(&self) -> Bytes {
        encode_frame(self.session, &self.payload)
    }
}

fn encode_frame(session: SessionId, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(session);
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    buf.freeze()
}

/// Read one frame from the tunnel
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;

    let session = header[0];
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;

    trace!("Read frame: session={}, len={}", session, len);

    Ok(Frame {
        session,
        payload: payload.freeze(),
    })
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "tunnel connection closed")
}

/// Shared write side of a tunnel connection
///
/// Whole frames are written under one lock so concurrent sessions never
/// interleave inside a frame. Pending writes fail as soon as the closed
/// signal is raised.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: Mutex<Option<W>>,
    closed: watch::Receiver<bool>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a writer; `closed` aborts pending and future writes
    pub fn new(writer: W, closed: watch::Receiver<bool>) -> Self {
        FrameWriter {
            inner: Mutex::new(Some(writer)),
            closed,
        }
    }

    /// Send session data, split into as many frames as needed
    ///
    /// An empty slice sends nothing; closing is explicit via
    /// [`send_close`](Self::send_close).
    pub async fn send_data(&self, session: SessionId, data: &[u8]) -> io::Result<()> {
        for chunk in data.chunks(MAX_FRAME_PAYLOAD) {
            self.write_frame(&encode_frame(session, chunk)).await?;
        }
        Ok(())
    }

    /// Send the zero-length close frame for a session
    pub async fn send_close(&self, session: SessionId) -> io::Result<()> {
        trace!("Sending close frame for session {}", session);
        self.write_frame(&encode_frame(session, &[])).await
    }

    async fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut closed = self.closed.clone();
        if *closed.borrow() {
            return Err(closed_error());
        }

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or_else(closed_error)?;

        tokio::select! {
            result = async {
                writer.write_all(frame).await?;
                writer.flush().await
            } => result,
            _ = closed.wait_for(|closed| *closed) => Err(closed_error()),
        }
    }

    /// Shut the writer down; later sends fail
    pub async fn shutdown(&self) {
        let writer = self.inner.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                trace!("Tunnel writer shutdown failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::duplex;

    #[test]
    fn test_frame_encode_layout() {
        let frame = Frame::data(7, Bytes::from_static(b"abc"));
        assert_eq!(&frame.encode()[..], &[7, 0x00, 0x03, b'a', b'b', b'c']);

        let close = Frame::close(7);
        assert!(close.is_close());
        assert_eq!(&close.encode()[..], &[7, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_read_frame_sequence() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&Frame::data(1, Bytes::from_static(b"hello")).encode());
        wire.extend_from_slice(&Frame::close(1).encode());
        let mut cursor = Cursor::new(wire);

        let first = read_frame(&mut cursor).await.unwrap();
        assert_eq!(first.session, 1);
        assert_eq!(&first.payload[..], b"hello");

        let second = read_frame(&mut cursor).await.unwrap();
        assert!(second.is_close());

        assert!(read_frame(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_payload() {
        let mut cursor = Cursor::new(vec![1, 0x00, 0x05, b'a']);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_send_data_splits_large_payloads() {
        let (near, mut far) = duplex(256 * 1024);
        let (_tx, rx) = watch::channel(false);
        let writer = FrameWriter::new(near, rx);

        let data = vec![0xAB; MAX_FRAME_PAYLOAD + 10];
        writer.send_data(3, &data).await.unwrap();
        writer.send_data(3, &[]).await.unwrap();
        writer.send_close(3).await.unwrap();

        let first = read_frame(&mut far).await.unwrap();
        assert_eq!(first.payload.len(), MAX_FRAME_PAYLOAD);
        let second = read_frame(&mut far).await.unwrap();
        assert_eq!(second.payload.len(), 10);
        let third = read_frame(&mut far).await.unwrap();
        assert!(third.is_close());
        assert_eq!(third.session, 3);
    }

    #[tokio::test]
    async fn test_closed_signal_aborts_blocked_write() {
        // a tiny pipe nobody reads from: the write blocks
        let (near, _far) = duplex(4);
        let (tx, rx) = watch::channel(false);
        let writer = std::sync::Arc::new(FrameWriter::new(near, rx));

        let pending = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.send_data(1, &[0u8; 64]).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send_replace(true);

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionAborted);
        assert!(writer.send_close(1).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_later_writes() {
        let (near, _far) = duplex(64);
        let (_tx, rx) = watch::channel(false);
        let writer = FrameWriter::new(near, rx);

        writer.shutdown().await;
        assert!(writer.send_close(1).await.is_err());
    }
}
