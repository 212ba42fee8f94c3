//! Message transport seen from the matchmaking server
//!
//! The dispatch loop only needs a handful of operations from the transport:
//! non-blocking polls for inbound messages and connection-state changes,
//! accept, send, close and naming a connection for diagnostics. Anything that
//! implements [`ServerTransport`] can host the matchmaking core.

pub mod memory;
pub mod udp;

pub use memory::MemoryTransport;
pub use udp::UdpServerTransport;

use lobby_shared::FrameError;
use std::fmt;

/// Opaque handle of one client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    None,
    Connecting,
    Connected,
    ClosedByPeer,
    ProblemDetectedLocally,
}

/// A connection moved from `old_state` to `state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatusChanged {
    pub connection: ConnectionId,
    pub old_state: ConnectionState,
    pub state: ConnectionState,
    /// Human readable peer description, including the connection name if set
    pub description: String,
    /// Debug text explaining why the connection ended, empty otherwise
    pub end_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub connection: ConnectionId,
    pub data: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind listen socket: {0}")]
    Bind(#[source] std::io::Error),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} is not connected")]
    NotConnected(ConnectionId),
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub trait ServerTransport {
    /// Pops the next message from an accepted connection, if any
    fn receive_message(&mut self) -> Option<IncomingMessage>;

    /// Pops the next connection-state change, if any
    fn poll_connection_event(&mut self) -> Option<ConnectionStatusChanged>;

    fn accept_connection(&mut self, connection: ConnectionId) -> Result<(), TransportError>;

    fn send_message(&mut self, connection: ConnectionId, data: &[u8])
        -> Result<(), TransportError>;

    /// Closes and forgets a connection. With `linger`, anything still queued
    /// for the peer is flushed before the close notice.
    fn close_connection(&mut self, connection: ConnectionId, reason: &str, linger: bool);

    fn set_connection_name(&mut self, connection: ConnectionId, name: &str);

    /// Releases listening resources; no further events are produced
    fn shutdown(&mut self);
}
