//! SOCKS5 handshake and request codec
//!
//! Reads the method negotiation and the CONNECT request from a client
//! stream. The request grammar is shared with the remote decoder, which
//! parses the same bytes back out of the tunnel.

use super::consts::*;
use super::types::{Address, SocksCommand, SocksRequest};
use crate::error::{Result, Socks5Error};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Perform the server side of the method negotiation
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// Only the no-auth method is accepted. On success `[0x05, 0x00]` is
/// written back; when no-auth is not offered `[0x05, 0xFF]` is written and
/// the handshake fails with [`Socks5Error::InvalidMethod`].
pub async fn perform_server_handshake<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1] as usize;

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::InvalidVersion(version).into());
    }

    let mut methods = vec![0u8; num_methods];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        debug!("Client offered no acceptable method: {:?}", methods);
        let rejected = async {
            stream
                .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
                .await?;
            stream.flush().await
        };
        if let Err(e) = rejected.await {
            trace!("Failed to send method rejection: {}", e);
        }
        return Err(Socks5Error::InvalidMethod.into());
    }

    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;

    trace!("Method negotiation completed");
    Ok(())
}

/// Parse a SOCKS5 request from the stream
///
/// Validates version, command (CONNECT only) and reserved byte, then reads
/// the address selected by the address type and the big-endian port.
pub async fn parse_request<S>(stream: &mut S) -> Result<SocksRequest>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; REQUEST_PREFIX_LEN];
    stream.read_exact(&mut header).await?;

    let [version, cmd_byte, reserved, addr_type] = header;

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::InvalidVersion(version).into());
    }

    match SocksCommand::from_byte(cmd_byte) {
        Some(SocksCommand::Connect) => {}
        _ => return Err(Socks5Error::UnsupportedCommand(cmd_byte).into()),
    }

    if reserved != SOCKS5_RESERVED {
        return Err(Socks5Error::InvalidReserve(reserved).into());
    }

    let address = parse_address(stream, addr_type).await?;
    let port = stream.read_u16().await?;

    let request = SocksRequest::connect(address, port);
    debug!("Parsed SOCKS5 request: {} to {}", request.command, request);

    Ok(request)
}

/// Parse the address portion of a SOCKS5 request
async fn parse_address<S>(stream: &mut S, addr_type: u8) -> Result<Address>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Ok(Address::Ipv4(addr))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain_len = stream.read_u8().await? as usize;
            let mut domain = vec![0u8; domain_len];
            stream.read_exact(&mut domain).await?;
            Ok(Address::domain(domain)?)
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            Ok(Address::Ipv6(addr))
        }

        _ => Err(Socks5Error::InvalidAddressType(addr_type).into()),
    }
}
