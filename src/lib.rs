//! # Remux - Eager SOCKS5 Tunnel Multiplexer
//!
//! Remux accepts SOCKS5 CONNECT requests locally, answers them immediately
//! and multiplexes the resulting streams over a small pool of long-lived
//! tunnel connections to a remote decoder, which dials the real targets.
//!
//! ## Features
//!
//! - **Eager replies**: the SOCKS5 success reply is sent before the tunnel
//!   is touched, saving a round trip per connection
//! - **Connection pooling**: up to 16 sessions share one tunnel connection
//! - **Bounded reuse**: a connection stops accepting sessions after 60
//!   seconds and is closed once its last session ends
//! - **Both ends in one binary**: run the front-end, the decoder, or both
//!
//! ## Usage
//!
//! ```rust,ignore
//! use remux::config::load_config;
//! use remux::client::run_client;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_client(config.client.unwrap(), shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Remux client -> (pooled tunnel) -> Remux server -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use client::run_client;
pub use config::{load_config, Config};
pub use error::{RemuxError, Socks5Error};
pub use server::run_server;

/// Version of the Remux library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
