//! Ordered list of pooled connections
//!
//! Newest connections sit at the front. Entries are identified by handle,
//! so removal never depends on position.

use std::collections::VecDeque;
use std::sync::Arc;

/// Connections ordered newest first
#[derive(Debug)]
pub struct ConnectionList<C> {
    entries: VecDeque<Arc<C>>,
}

impl<C> Default for ConnectionList<C> {
    fn default() -> Self {
        ConnectionList {
            entries: VecDeque::new(),
        }
    }
}

impl<C> ConnectionList<C> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection at the front
    pub fn push_front(&mut self, conn: Arc<C>) {
        self.entries.push_front(conn);
    }

    /// The front connection, if any
    pub fn front(&self) -> Option<&Arc<C>> {
        self.entries.front()
    }

    /// Remove a connection by handle
    pub fn remove(&mut self, conn: &Arc<C>) -> Option<Arc<C>> {
        let idx = self.entries.iter().position(|c| Arc::ptr_eq(c, conn))?;
        self.entries.remove(idx)
    }

    /// Keep only connections matching the predicate
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Arc<C>) -> bool,
    {
        self.entries.retain(f);
    }

    /// Remove and return every connection
    pub fn take_all(&mut self) -> Vec<Arc<C>> {
        self.entries.drain(..).collect()
    }

    /// Number of connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate front to back
    pub fn iter(&self) -> impl Iterator<Item = &Arc<C>> {
        self.entries.iter()
    }
}
