//! In-process transport used to drive the server without sockets
//!
//! A [`MemoryTransport`] is a cheap handle onto shared state: keep a clone on
//! the test side to inject connections and messages and to inspect what the
//! server sent back.

use super::{
    ConnectionId, ConnectionState, ConnectionStatusChanged, IncomingMessage, ServerTransport,
    TransportError,
};
use lobby_shared::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct MemoryConnection {
    state: ConnectionState,
    name: String,
    outbox: Vec<Vec<u8>>,
    closed: Option<ClosedWith>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ClosedWith {
    reason: String,
    linger: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_connection_id: u32,
    connections: HashMap<ConnectionId, MemoryConnection>,
    inbound: VecDeque<IncomingMessage>,
    events: VecDeque<ConnectionStatusChanged>,
    shut_down: bool,
}

impl MemoryState {
    fn push_event(&mut self, connection: ConnectionId, old_state: ConnectionState, state: ConnectionState, end_reason: &str) {
        self.events.push_back(ConnectionStatusChanged {
            connection,
            old_state,
            state,
            description: format!("memory {}", connection),
            end_reason: end_reason.to_string(),
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new inbound connection; the server sees it as `Connecting`
    pub fn connect(&self) -> ConnectionId {
        let mut state = self.state();
        state.next_connection_id += 1;
        let connection = ConnectionId(state.next_connection_id);

        state.connections.insert(
            connection,
            MemoryConnection {
                state: ConnectionState::Connecting,
                name: String::new(),
                outbox: Vec::new(),
                closed: None,
            },
        );
        state.push_event(connection, ConnectionState::None, ConnectionState::Connecting, "");
        connection
    }

    /// The peer closes its end
    pub fn disconnect(&self, connection: ConnectionId) {
        self.end(connection, ConnectionState::ClosedByPeer, "Closed by peer");
    }

    /// The transport gives up on the peer, e.g. after a timeout
    pub fn drop_connection(&self, connection: ConnectionId, reason: &str) {
        self.end(connection, ConnectionState::ProblemDetectedLocally, reason);
    }

    fn end(&self, connection: ConnectionId, new_state: ConnectionState, reason: &str) {
        let mut state = self.state();
        let old_state = match state.connections.get_mut(&connection) {
            Some(conn)
                if matches!(
                    conn.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) =>
            {
                let old_state = conn.state;
                conn.state = new_state;
                old_state
            }
            _ => return,
        };
        state.push_event(connection, old_state, new_state, reason);
    }

    pub fn deliver(&self, connection: ConnectionId, message: &Message) {
        self.deliver_raw(connection, message.encode());
    }

    pub fn deliver_raw(&self, connection: ConnectionId, data: Vec<u8>) {
        self.state()
            .inbound
            .push_back(IncomingMessage { connection, data });
    }

    /// Drains everything sent to `connection`, skipping undecodable bytes
    pub fn take_sent(&self, connection: ConnectionId) -> Vec<Message> {
        self.take_sent_raw(connection)
            .iter()
            .filter_map(|bytes| Message::decode(bytes).ok())
            .collect()
    }

    pub fn take_sent_raw(&self, connection: ConnectionId) -> Vec<Vec<u8>> {
        self.state()
            .connections
            .get_mut(&connection)
            .map(|conn| std::mem::take(&mut conn.outbox))
            .unwrap_or_default()
    }

    /// Chat lines sent to `connection`, draining its outbox
    pub fn take_chat(&self, connection: ConnectionId) -> Vec<Vec<u8>> {
        self.take_sent(connection)
            .into_iter()
            .filter_map(|message| match message {
                Message::Chat(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn is_connected(&self, connection: ConnectionId) -> bool {
        self.state()
            .connections
            .get(&connection)
            .map_or(false, |conn| conn.state == ConnectionState::Connected && conn.closed.is_none())
    }

    pub fn connection_name(&self, connection: ConnectionId) -> Option<String> {
        self.state()
            .connections
            .get(&connection)
            .map(|conn| conn.name.clone())
    }

    /// `Some(linger)` once the server closed the connection
    pub fn closed_with_linger(&self, connection: ConnectionId) -> Option<bool> {
        self.state()
            .connections
            .get(&connection)
            .and_then(|conn| conn.closed.as_ref().map(|closed| closed.linger))
    }

    pub fn close_reason(&self, connection: ConnectionId) -> Option<String> {
        self.state()
            .connections
            .get(&connection)
            .and_then(|conn| conn.closed.as_ref().map(|closed| closed.reason.clone()))
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }
}

impl ServerTransport for MemoryTransport {
    fn receive_message(&mut self) -> Option<IncomingMessage> {
        let mut state = self.state();
        while let Some(message) = state.inbound.pop_front() {
            let accepted = state
                .connections
                .get(&message.connection)
                .map_or(false, |conn| conn.state == ConnectionState::Connected && conn.closed.is_none());
            if accepted {
                return Some(message);
            }
        }
        None
    }

    fn poll_connection_event(&mut self) -> Option<ConnectionStatusChanged> {
        self.state().events.pop_front()
    }

    fn accept_connection(&mut self, connection: ConnectionId) -> Result<(), TransportError> {
        let mut state = self.state();
        let conn = state
            .connections
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;

        if conn.state != ConnectionState::Connecting {
            return Err(TransportError::NotConnected(connection));
        }
        conn.state = ConnectionState::Connected;
        Ok(())
    }

    fn send_message(
        &mut self,
        connection: ConnectionId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        let conn = state
            .connections
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;

        if conn.state != ConnectionState::Connected || conn.closed.is_some() {
            return Err(TransportError::NotConnected(connection));
        }
        conn.outbox.push(data.to_vec());
        Ok(())
    }

    fn close_connection(&mut self, connection: ConnectionId, reason: &str, linger: bool) {
        if let Some(conn) = self.state().connections.get_mut(&connection) {
            conn.closed = Some(ClosedWith {
                reason: reason.to_string(),
                linger,
            });
        }
    }

    fn set_connection_name(&mut self, connection: ConnectionId, name: &str) {
        if let Some(conn) = self.state().connections.get_mut(&connection) {
            conn.name = name.to_string();
        }
    }

    fn shutdown(&mut self) {
        let mut state = self.state();
        state.shut_down = true;
        state.inbound.clear();
        state.events.clear();
    }
}
