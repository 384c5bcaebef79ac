//! SOCKS5 module for Remux
//!
//! This module implements the client-facing SOCKS5 handshake and the
//! request grammar shared with the remote decoder. Only the no-auth method
//! and the CONNECT command are supported.

mod codec;
mod consts;
mod stream;
mod types;

pub use codec::{parse_request, perform_server_handshake};
pub use consts::*;
pub use stream::{dump_stream, load_stream, SocksStream};
pub use types::{Address, DomainName, SocksCommand, SocksRequest};
