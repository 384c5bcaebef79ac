//! Remote address with cached resolution
//!
//! The tunnel endpoint is dialed every time the pool needs a new
//! connection; the resolved address is cached until a dial fails.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Remote endpoint that caches its resolved socket address
#[derive(Debug, Clone)]
pub struct RemoteAddr {
    /// The original address string
    addr: String,
    /// Cached resolved address
    cached: Arc<RwLock<Option<SocketAddr>>>,
}

impl RemoteAddr {
    /// Create a new address without cached resolution
    pub fn new(addr: &str) -> Self {
        RemoteAddr {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the original address string
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get the cached address if available
    pub async fn get_cached(&self) -> Option<SocketAddr> {
        *self.cached.read().await
    }

    /// Forget the cached address so the next dial resolves again
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Resolve the address, using cache if available
    pub async fn resolve(&self) -> Result<SocketAddr> {
        if let Some(cached) = self.get_cached().await {
            return Ok(cached);
        }

        let resolved = tokio::net::lookup_host(self.addr.as_str())
            .await
            .with_context(|| format!("Failed to resolve address: {}", self.addr))?
            .next()
            .with_context(|| format!("No addresses found for: {}", self.addr))?;

        *self.cached.write().await = Some(resolved);
        Ok(resolved)
    }
}

impl From<SocketAddr> for RemoteAddr {
    fn from(addr: SocketAddr) -> Self {
        RemoteAddr {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(Some(addr))),
        }
    }
}

impl From<&str> for RemoteAddr {
    fn from(addr: &str) -> Self {
        RemoteAddr::new(addr)
    }
}
