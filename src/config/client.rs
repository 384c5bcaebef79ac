//! Role configuration types
//!
//! Defines the root configuration and the two roles a process can run:
//! the SOCKS5 front-end (`client`) and the remote decoder (`server`).

use super::{PoolConfig, TcpConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// SOCKS5 front-end role
    #[serde(default)]
    pub client: Option<ClientConfig>,

    /// Remote decoder role
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.client.is_none() && self.server.is_none() {
            return Err("must configure a [client] or a [server] role".to_string());
        }
        if let Some(client) = &self.client {
            client.pool.validate()?;
        }
        Ok(())
    }
}

/// SOCKS5 front-end configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Address the SOCKS5 listener binds to (e.g., "127.0.0.1:1080")
    pub listen_addr: String,

    /// Remote decoder address (e.g., "tunnel.example.com:7000")
    pub remote_addr: String,

    /// Transport configuration for tunnel connections
    #[serde(default)]
    pub transport: TransportConfig,

    /// Connection pool configuration
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Default target connect timeout in seconds
fn default_target_connect_timeout() -> u64 {
    10
}

/// Remote decoder configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the tunnel listener binds to (e.g., "0.0.0.0:7000")
    pub listen_addr: String,

    /// Timeout in seconds when dialing a session's target
    #[serde(default = "default_target_connect_timeout")]
    pub connect_timeout: u64,

    /// Socket options applied to accepted tunnel connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl ServerConfig {
    /// Target dial timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}
