//! Pool manager
//!
//! Places incoming client streams onto pooled connections, dialing a new
//! tunnel connection whenever no existing one is eligible.

use super::connection::{ConnectionId, PooledConnection};
use super::frame::SessionId;
use super::list::ConnectionList;
use crate::config::PoolConfig;
use crate::error::RemuxError;
use crate::transport::{RemoteAddr, StreamDyn, Transport};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Statistics for the connection pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Tunnel connections dialed
    pub total_created: AtomicUsize,
    /// Sessions attached
    pub total_attached: AtomicUsize,
    /// Connections moved to the retired list
    pub total_retired: AtomicUsize,
    /// Failed dials
    pub dial_failures: AtomicUsize,
}

impl PoolStats {
    /// Create new pool stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_attached: self.total_attached.load(Ordering::Relaxed),
            total_retired: self.total_retired.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool statistics
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub total_created: usize,
    pub total_attached: usize,
    pub total_retired: usize,
    pub dial_failures: usize,
}

/// Where a submitted stream ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    /// Connection serial number
    pub connection: ConnectionId,
    /// Session id on that connection
    pub session: SessionId,
}

/// A stream the pool could not place, handed back to the caller
pub struct Rejected<C> {
    /// The untouched client stream
    pub stream: C,
    /// Why it was rejected
    pub error: RemuxError,
}

impl<C> fmt::Debug for Rejected<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct PoolLists<S> {
    available: ConnectionList<PooledConnection<S>>,
    retired: ConnectionList<PooledConnection<S>>,
}

/// Multiplexing connection pool
pub struct PoolManager<T: Transport> {
    config: PoolConfig,
    transport: Arc<T>,
    remote_addr: RemoteAddr,
    /// Serializes submissions; held across a dial
    submit_lock: Mutex<()>,
    lists: Mutex<PoolLists<T::Stream>>,
    next_id: AtomicU64,
    stats: PoolStats,
}

impl<T: Transport> PoolManager<T> {
    /// Create an empty pool dialing `remote_addr` through `transport`
    ///
    /// The session limit is clamped to 255 per connection; see
    /// [`PoolConfig::validate`].
    pub fn new(config: PoolConfig, transport: Arc<T>, remote_addr: RemoteAddr) -> Self {
        PoolManager {
            config,
            transport,
            remote_addr,
            submit_lock: Mutex::new(()),
            lists: Mutex::new(PoolLists {
                available: ConnectionList::new(),
                retired: ConnectionList::new(),
            }),
            next_id: AtomicU64::new(1),
            stats: PoolStats::new(),
        }
    }

    /// Pool statistics
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Attach a client stream to an eligible connection, dialing if needed
    ///
    /// Connections found ineligible on the way are retired. On failure the
    /// stream comes back inside [`Rejected`].
    pub async fn submit<C>(&self, stream: C) -> Result<Attachment, Rejected<C>>
    where
        C: StreamDyn + 'static,
    {
        let _serial = self.submit_lock.lock().await;
        let now = Instant::now();
        let mut stream = stream;
        let mut retiring = Vec::new();

        let mut lists = self.lists.lock().await;
        lists.retired.retain(|conn| !conn.is_closed());

        while let Some(conn) = lists.available.front().cloned() {
            match conn.try_attach_at(stream, now).await {
                Ok(session) => {
                    drop(lists);
                    self.retire_all(retiring).await;
                    return Ok(self.attached(conn.id(), session));
                }
                Err(returned) => {
                    stream = returned;
                    lists.available.remove(&conn);
                    lists.retired.push_front(conn.clone());
                    retiring.push(conn);
                }
            }
        }
        drop(lists);
        self.retire_all(retiring).await;

        let transport = match self.transport.connect(&self.remote_addr).await {
            Ok(transport) => transport,
            Err(e) => {
                self.stats.dial_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to dial {}: {:#}", self.remote_addr.addr(), e);
                return Err(Rejected {
                    stream,
                    error: RemuxError::dial(e),
                });
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = PooledConnection::new(id, transport, &self.config);
        self.stats.total_created.fetch_add(1, Ordering::Relaxed);
        info!("New tunnel connection {} to {}", id, self.remote_addr.addr());

        match conn.attach(stream).await {
            Ok(session) => {
                self.lists.lock().await.available.push_front(conn);
                Ok(self.attached(id, session))
            }
            Err(stream) => {
                // fresh connection already closed by a tunnel error
                conn.close().await;
                Err(Rejected {
                    stream,
                    error: RemuxError::ConnectionClosed,
                })
            }
        }
    }

    fn attached(&self, connection: ConnectionId, session: SessionId) -> Attachment {
        self.stats.total_attached.fetch_add(1, Ordering::Relaxed);
        debug!("Session {} attached to connection {}", session, connection);
        Attachment {
            connection,
            session,
        }
    }

    async fn retire_all(&self, conns: Vec<Arc<PooledConnection<T::Stream>>>) {
        for conn in conns {
            self.stats.total_retired.fetch_add(1, Ordering::Relaxed);
            debug!("Retiring connection {}", conn.id());
            conn.retire().await;
        }
    }

    /// Number of connections offered to new sessions
    pub async fn available_len(&self) -> usize {
        self.lists.lock().await.available.len()
    }

    /// Number of retired connections still tracked
    pub async fn retired_len(&self) -> usize {
        self.lists.lock().await.retired.len()
    }

    /// Close every pooled connection
    pub async fn shutdown(&self) {
        let conns = {
            let mut lists = self.lists.lock().await;
            let mut conns = lists.available.take_all();
            conns.extend(lists.retired.take_all());
            conns
        };

        for conn in &conns {
            conn.close().await;
        }
        info!("Connection pool shut down ({} connections)", conns.len());
    }

    /// Log pool health status
    pub fn log_health(&self) {
        let stats = self.stats.snapshot();
        debug!(
            "Pool health: created={}, attached={}, retired={}, dial_failures={}",
            stats.total_created, stats.total_attached, stats.total_retired, stats.dial_failures
        );
    }
}

impl<T: Transport> fmt::Debug for PoolManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("remote_addr", &self.remote_addr.addr())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
