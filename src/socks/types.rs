//! SOCKS5 type definitions
//!
//! Defines the request value produced by the parser and consumed by the
//! header encoder.

use super::consts::*;
use crate::error::Socks5Error;
use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND (rejected by the parser)
    Bind,
    /// UDP ASSOCIATE (rejected by the parser)
    UdpAssociate,
}

impl SocksCommand {
    /// Parse a command byte into SocksCommand
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Some(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(SocksCommand::UdpAssociate),
            _ => None,
        }
    }

    /// Convert SocksCommand to byte
    pub fn to_byte(self) -> u8 {
        match self {
            SocksCommand::Connect => SOCKS5_CMD_TCP_CONNECT,
            SocksCommand::Bind => SOCKS5_CMD_TCP_BIND,
            SocksCommand::UdpAssociate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for SocksCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksCommand::Connect => write!(f, "CONNECT"),
            SocksCommand::Bind => write!(f, "BIND"),
            SocksCommand::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Domain name as carried on the wire
///
/// Raw bytes, not required to be UTF-8. The length always fits the 1-byte
/// prefix, so a name can only be built through [`DomainName::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName(Bytes);

impl DomainName {
    /// Wrap a name of at most [`MAX_DOMAIN_LEN`] bytes
    pub fn new(name: impl Into<Bytes>) -> std::result::Result<Self, Socks5Error> {
        let name = name.into();
        if name.len() > MAX_DOMAIN_LEN {
            return Err(Socks5Error::DomainTooLong(name.len()));
        }
        Ok(DomainName(name))
    }

    /// Name bytes, without the length prefix
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Name length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the name is empty (legal on the wire)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Destination address of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// IPv4 address
    Ipv4([u8; 4]),
    /// Domain name
    Domain(DomainName),
    /// IPv6 address
    Ipv6([u8; 16]),
}

impl Address {
    /// Build a domain address, rejecting names longer than 255 bytes
    pub fn domain(name: impl Into<Bytes>) -> std::result::Result<Self, Socks5Error> {
        DomainName::new(name).map(Address::Domain)
    }

    /// Get the address type byte for SOCKS5 protocol
    pub fn addr_type(&self) -> u8 {
        match self {
            Address::Ipv4(_) => SOCKS5_ADDR_TYPE_IPV4,
            Address::Domain(_) => SOCKS5_ADDR_TYPE_DOMAIN,
            Address::Ipv6(_) => SOCKS5_ADDR_TYPE_IPV6,
        }
    }

    /// Raw address bytes, without the domain length prefix
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Address::Ipv4(ip) => ip,
            Address::Domain(name) => name.as_bytes(),
            Address::Ipv6(ip) => ip,
        }
    }

    /// Number of bytes the address occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match self {
            Address::Ipv4(_) => 4,
            Address::Domain(name) => 1 + name.len(),
            Address::Ipv6(_) => 16,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Ipv4(ip) => write!(f, "{}", Ipv4Addr::from(*ip)),
            Address::Domain(name) => write!(f, "{}", String::from_utf8_lossy(name.as_bytes())),
            Address::Ipv6(ip) => write!(f, "[{}]", Ipv6Addr::from(*ip)),
        }
    }
}

/// A validated SOCKS5 request
///
/// Version and reserved byte are checked by the parser and not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    /// Requested command
    pub command: SocksCommand,
    /// Destination address
    pub address: Address,
    /// Destination port
    pub port: u16,
}

impl SocksRequest {
    /// Create a CONNECT request
    pub fn connect(address: Address, port: u16) -> Self {
        SocksRequest {
            command: SocksCommand::Connect,
            address,
            port,
        }
    }

    /// Total header length: 4 + address length + 2
    pub fn encoded_len(&self) -> usize {
        REQUEST_PREFIX_LEN + self.address.encoded_len() + 2
    }

    /// Serialize the request with the same layout the parser consumes
    ///
    /// ```text
    /// +----+-----+-------+------+----------+----------+
    /// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    /// +----+-----+-------+------+----------+----------+
    /// | 1  |  1  | X'00' |  1   | Variable |    2     |
    /// +----+-----+-------+------+----------+----------+
    /// ```
    pub fn encode_header(&self) -> Bytes {
        self.encode_with_code(self.command.to_byte())
    }

    /// Serialize the CONNECT reply sent back to the client
    ///
    /// Identical to the header except that the command byte carries the
    /// success reply code; the bound address echoes the destination.
    pub fn encode_reply(&self) -> Bytes {
        self.encode_with_code(SOCKS5_REPLY_SUCCEEDED)
    }

    fn encode_with_code(&self, code: u8) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(SOCKS5_VERSION);
        buf.put_u8(code);
        buf.put_u8(SOCKS5_RESERVED);
        buf.put_u8(self.address.addr_type());
        if let Address::Domain(name) = &self.address {
            // bounded by DomainName::new
            buf.put_u8(name.len() as u8);
        }
        buf.put_slice(self.address.as_bytes());
        buf.put_u16(self.port);
        buf.freeze()
    }

    /// Resolve the destination to a socket address
    ///
    /// For IP addresses, this returns immediately.
    /// For domain names, this performs DNS resolution.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match &self.address {
            Address::Ipv4(ip) => Ok(SocketAddr::from((Ipv4Addr::from(*ip), self.port))),
            Address::Ipv6(ip) => Ok(SocketAddr::from((Ipv6Addr::from(*ip), self.port))),
            Address::Domain(name) => {
                let domain = std::str::from_utf8(name.as_bytes())
                    .with_context(|| "Invalid UTF-8 in domain name")?;
                let resolved = tokio::net::lookup_host((domain, self.port))
                    .await
                    .with_context(|| format!("Failed to resolve domain: {}", domain))?
                    .next()
                    .with_context(|| format!("No addresses found for domain: {}", domain))?;
                Ok(resolved)
            }
        }
    }
}

impl fmt::Display for SocksRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks_command_from_byte() {
        assert_eq!(SocksCommand::from_byte(1), Some(SocksCommand::Connect));
        assert_eq!(SocksCommand::from_byte(2), Some(SocksCommand::Bind));
        assert_eq!(SocksCommand::from_byte(3), Some(SocksCommand::UdpAssociate));
        assert_eq!(SocksCommand::from_byte(4), None);
    }

    #[test]
    fn test_socks_command_display() {
        assert_eq!(format!("{}", SocksCommand::Connect), "CONNECT");
        assert_eq!(format!("{}", SocksCommand::UdpAssociate), "UDP ASSOCIATE");
    }

    #[test]
    fn test_encode_header_ipv4() {
        let request = SocksRequest::connect(Address::Ipv4([127, 0, 0, 1]), 80);
        assert_eq!(
            &request.encode_header()[..],
            &[0x05, 0x01, 0x00, 0x01, 0x7F, 0x00, 0x00, 0x01, 0x00, 0x50]
        );
        assert_eq!(request.encoded_len(), 10);
    }

    #[test]
    fn test_encode_header_ipv6_length() {
        let request = SocksRequest::connect(Address::Ipv6([0; 16]), 443);
        assert_eq!(request.encode_header().len(), 4 + 16 + 2);
    }

    #[test]
    fn test_encode_header_domain() {
        let request = SocksRequest::connect(Address::domain(Bytes::from_static(b"test")).unwrap(), 80);
        let bytes = request.encode_header();

        assert_eq!(bytes[3], SOCKS5_ADDR_TYPE_DOMAIN);
        assert_eq!(bytes[4], 4);
        assert_eq!(&bytes[5..9], b"test");
        assert_eq!(&bytes[9..11], &80u16.to_be_bytes());
        assert_eq!(bytes.len(), 4 + 1 + 4 + 2);
    }

    #[test]
    fn test_domain_length_bound() {
        let longest = vec![b'a'; MAX_DOMAIN_LEN];
        let request = SocksRequest::connect(Address::domain(longest).unwrap(), 80);
        let bytes = request.encode_header();
        assert_eq!(bytes[4], 255);
        assert_eq!(bytes.len(), 4 + 1 + 255 + 2);

        let err = Address::domain(vec![b'a'; 256]).unwrap_err();
        assert_eq!(err, Socks5Error::DomainTooLong(256));
        assert!(DomainName::new(vec![b'x'; 300]).is_err());

        let empty = DomainName::new(Bytes::new()).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_encode_reply_only_differs_in_command_byte() {
        let request = SocksRequest::connect(Address::Ipv4([10, 1, 2, 3]), 8080);
        let header = request.encode_header();
        let reply = request.encode_reply();

        assert_eq!(header[1], SOCKS5_CMD_TCP_CONNECT);
        assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);
        assert_eq!(header[0], reply[0]);
        assert_eq!(header[2..], reply[2..]);
        // the request value itself still reports CONNECT
        assert_eq!(request.command, SocksCommand::Connect);
    }

    #[test]
    fn test_request_display() {
        let request = SocksRequest::connect(Address::Ipv4([127, 0, 0, 1]), 8080);
        assert_eq!(format!("{}", request), "127.0.0.1:8080");

        let request = SocksRequest::connect(Address::domain(Bytes::from_static(b"test.com")).unwrap(), 443);
        assert_eq!(format!("{}", request), "test.com:443");

        let mut ip = [0u8; 16];
        ip[15] = 1;
        let request = SocksRequest::connect(Address::Ipv6(ip), 53);
        assert_eq!(format!("{}", request), "[::1]:53");
    }

    #[tokio::test]
    async fn test_request_resolve_ip() {
        let request = SocksRequest::connect(Address::Ipv4([127, 0, 0, 1]), 8080);
        let resolved = request.resolve().await.unwrap();
        assert_eq!(resolved, "127.0.0.1:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn test_request_resolve_rejects_non_utf8_domain() {
        let request = SocksRequest::connect(Address::domain(Bytes::from_static(&[0xFF, 0xFE])).unwrap(), 80);
        assert!(request.resolve().await.is_err());
    }
}
