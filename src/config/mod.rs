//! Configuration module for Remux
//!
//! This module provides configuration types and parsing for both roles.

mod client;
mod pool;
mod transport;

pub use client::{ClientConfig, Config, ServerConfig};
pub use pool::PoolConfig;
pub use transport::{TcpConfig, TransportConfig};

use crate::error::RemuxError;
use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config
        .validate()
        .map_err(RemuxError::Config)
        .context("Invalid configuration")?;
    Ok(config)
}
