//! Error types for Remux
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use thiserror::Error;

/// Main error type for Remux operations
#[derive(Error, Debug)]
pub enum RemuxError {
    /// IO error (short read, reset, write failure)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),

    /// A new tunnel connection could not be established
    #[error("Dial error: {0}")]
    Dial(String),

    /// The pooled connection was closed before the operation completed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// SOCKS5 handshake and request errors
///
/// Every variant is fatal to the single handshake attempt that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Socks5Error {
    /// Version byte was not 0x05
    #[error("Invalid SOCKS version: {0}")]
    InvalidVersion(u8),

    /// The client did not offer the no-auth method
    #[error("No acceptable authentication method")]
    InvalidMethod,

    /// Command other than CONNECT
    #[error("Command not supported: {0}")]
    UnsupportedCommand(u8),

    /// Reserved byte was not 0x00
    #[error("Invalid reserved byte: {0}")]
    InvalidReserve(u8),

    /// Address type other than IPv4, domain or IPv6
    #[error("Invalid address type: {0}")]
    InvalidAddressType(u8),

    /// Domain name longer than the 1-byte length prefix allows
    #[error("Domain name too long: {0} bytes")]
    DomainTooLong(usize),
}

impl RemuxError {
    /// Build a dial error from any displayable cause, keeping the whole chain
    pub fn dial(cause: impl std::fmt::Display) -> Self {
        RemuxError::Dial(format!("{:#}", cause))
    }

    /// Whether this error came from malformed SOCKS5 input
    pub fn is_protocol(&self) -> bool {
        matches!(self, RemuxError::Socks5(_))
    }
}

/// Result alias used by the codec and the pool
pub type Result<T> = std::result::Result<T, RemuxError>;
