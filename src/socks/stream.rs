//! Streams bound to a parsed SOCKS5 request
//!
//! [`dump_stream`] completes the client-facing handshake and returns a
//! stream whose reads yield the serialized request header followed by the
//! client's payload, ready to be relayed through the tunnel.
//! [`load_stream`] is the far-end counterpart: it consumes that header and
//! returns a stream whose reads yield only the payload.

use super::codec::{parse_request, perform_server_handshake};
use super::types::{Address, SocksCommand, SocksRequest};
use crate::error::Result;
use bytes::{Buf, Bytes};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::debug;

/// A byte stream carrying SOCKS5 request metadata
#[derive(Debug)]
pub struct SocksStream<S> {
    inner: S,
    request: SocksRequest,
    /// Bytes served to readers before any byte of `inner`
    pending: Bytes,
    encoded: bool,
}

impl<S> SocksStream<S> {
    /// The parsed request
    pub fn request(&self) -> &SocksRequest {
        &self.request
    }

    /// Requested command
    pub fn command(&self) -> SocksCommand {
        self.request.command
    }

    /// Address type byte
    pub fn address_type(&self) -> u8 {
        self.request.address.addr_type()
    }

    /// Destination address
    pub fn address(&self) -> &Address {
        &self.request.address
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        self.request.port
    }

    /// Whether reads start with the serialized request header
    pub fn encoded(&self) -> bool {
        self.encoded
    }

    /// Number of header bytes not yet consumed by readers
    pub fn pending_header(&self) -> usize {
        self.pending.len()
    }
}

/// Run the SOCKS5 handshake on an accepted client stream
///
/// Negotiates the method, parses the CONNECT request and answers it with
/// the request echoed under the success code. The returned stream is
/// encoded: the tunnel header is queued ahead of the client's payload.
pub async fn dump_stream<S>(mut stream: S) -> Result<SocksStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    perform_server_handshake(&mut stream).await?;
    let request = parse_request(&mut stream).await?;

    let reply = request.encode_reply();
    let header = request.encode_header();

    stream.write_all(&reply).await?;
    stream.flush().await?;

    debug!("SOCKS5 {} request to {} accepted", request.command, request);

    Ok(SocksStream {
        inner: stream,
        request,
        pending: header,
        encoded: true,
    })
}

/// Load a request header from a tunnel session stream
///
/// No negotiation and no reply: the header is consumed and reads on the
/// returned stream yield the relayed payload only.
pub async fn load_stream<S>(mut stream: S) -> Result<SocksStream<S>>
where
    S: AsyncRead + Unpin,
{
    let request = parse_request(&mut stream).await?;

    Ok(SocksStream {
        inner: stream,
        request,
        pending: Bytes::new(),
        encoded: false,
    })
}

impl<S: AsyncRead + Unpin> AsyncRead for SocksStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        if this.pending.has_remaining() {
            let n = std::cmp::min(this.pending.len(), buf.remaining());
            buf.put_slice(&this.pending[..n]);
            this.pending.advance(n);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SocksStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
