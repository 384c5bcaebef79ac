//! Connection pool module for Remux
//!
//! This module multiplexes many client sessions over a small set of tunnel
//! connections. A connection accepts new sessions only while it is young and
//! has ids left; afterwards it is retired and lives on until its last session
//! ends.

mod connection;
pub mod frame;
mod list;
mod manager;
mod session;

pub use connection::{ConnectionId, PooledConnection};
pub use frame::{read_frame, Frame, FrameWriter, SessionId};
pub use list::ConnectionList;
pub use manager::{Attachment, PoolManager, PoolStats, PoolStatsSnapshot, Rejected};
pub use session::Session;
