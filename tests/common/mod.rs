//! Test utilities and mocks for Remux
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use remux::config::{ServerConfig, TcpConfig, TransportConfig};
use remux::transport::{RemoteAddr, Transport};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{duplex, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Create a pair of connected duplex streams for testing
pub fn create_mock_stream_pair() -> (DuplexStream, DuplexStream) {
    duplex(8192)
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Spawn a TCP echo server and return its address
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Decoder configuration for a listener bound by the test
pub fn server_config(listen_addr: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen_addr: listen_addr.to_string(),
        connect_timeout: 5,
        tcp: TcpConfig::default(),
    }
}

/// In-memory transport
///
/// Every dial creates a duplex pair; the far end is handed to the test
/// through the receiver returned by [`MockTransport::new_pair`].
#[derive(Debug)]
pub struct MockTransport {
    far_ends: mpsc::UnboundedSender<DuplexStream>,
    dials: AtomicUsize,
    failing: AtomicBool,
}

impl MockTransport {
    /// Create a transport and the receiver of its far ends
    pub fn new_pair() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (far_ends, rx) = mpsc::unbounded_channel();
        let transport = MockTransport {
            far_ends,
            dials: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        };
        (Arc::new(transport), rx)
    }

    /// Successful dials so far
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Make every following dial fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Stream = DuplexStream;

    fn new(_config: &TransportConfig) -> anyhow::Result<Self> {
        let (far_ends, _) = mpsc::unbounded_channel();
        Ok(MockTransport {
            far_ends,
            dials: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    async fn connect(&self, addr: &RemoteAddr) -> anyhow::Result<Self::Stream> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused by {}", addr.addr());
        }
        self.dials.fetch_add(1, Ordering::SeqCst);

        let (near, far) = duplex(256 * 1024);
        let _ = self.far_ends.send(far);
        Ok(near)
    }
}

/// Mock SOCKS5 handshake data
pub mod socks5_mock {
    use remux::socks::*;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a method selection request offering only username/password
    pub fn create_auth_request_password_only() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, 0x02]
    }

    /// Create a connect command to IPv4 address
    pub fn create_connect_ipv4(ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
        ];
        cmd.extend_from_slice(&ip);
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// The reply the front-end sends for a request: the request with code 0
    pub fn expected_reply(request: &[u8]) -> Vec<u8> {
        let mut reply = request.to_vec();
        reply[1] = SOCKS5_REPLY_SUCCEEDED;
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_mock_stream_pair() {
        let (mut a, mut b) = create_mock_stream_pair();

        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        a.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_mock_transport_hands_out_far_ends() {
        let (transport, mut far_ends) = MockTransport::new_pair();
        let addr = RemoteAddr::new("mock:1");

        let _near = transport.connect(&addr).await.unwrap();
        assert_eq!(transport.dials(), 1);
        assert!(far_ends.recv().await.is_some());

        transport.set_failing(true);
        assert!(transport.connect(&addr).await.is_err());
        assert_eq!(transport.dials(), 1);
    }

    #[test]
    fn test_socks5_mock_connect_ipv4() {
        let cmd = socks5_mock::create_connect_ipv4([192, 168, 1, 1], 8080);
        assert_eq!(cmd[0], 5); // SOCKS5 version
        assert_eq!(cmd[1], 1); // CONNECT
        assert_eq!(cmd[3], 1); // IPv4
        assert_eq!(&cmd[4..8], &[192, 168, 1, 1]);

        let reply = socks5_mock::expected_reply(&cmd);
        assert_eq!(reply[1], 0);
        assert_eq!(&reply[2..], &cmd[2..]);
    }
}
