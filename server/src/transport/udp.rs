//! Datagram transport with a thin session layer
//!
//! A tokio task owns the blocking side of the socket and forwards decoded
//! frames over an unbounded channel. Everything else (session bookkeeping,
//! heartbeats and timeouts) happens synchronously whenever the dispatch loop
//! polls, so the server never awaits inside a tick.

use super::{
    ConnectionId, ConnectionState, ConnectionStatusChanged, IncomingMessage, ServerTransport,
    TransportError,
};
use lobby_shared::{
    TransportFrame, CONNECTION_TIMEOUT, HEARTBEAT_INTERVAL, MAX_DATAGRAM_SIZE, TRANSPORT_VERSION,
};
use log::{debug, error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Session {
    addr: SocketAddr,
    state: ConnectionState,
    name: String,
    last_seen: Instant,
}

impl Session {
    fn is_open(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    fn describe(&self, connection: ConnectionId) -> String {
        if self.name.is_empty() {
            format!("{} {}", connection, self.addr)
        } else {
            format!("{} {} '{}'", connection, self.addr, self.name)
        }
    }
}

pub struct UdpServerTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    frame_rx: mpsc::UnboundedReceiver<(SocketAddr, TransportFrame)>,
    receiver: Option<JoinHandle<()>>,

    sessions: HashMap<ConnectionId, Session>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
    next_connection_id: u32,

    inbound: VecDeque<IncomingMessage>,
    events: VecDeque<ConnectionStatusChanged>,
    last_heartbeat: Instant,
}

impl UdpServerTransport {
    /// Binds the listen socket and starts the receive task
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = Arc::new(UdpSocket::bind(addr).await.map_err(TransportError::Bind)?);
        let local_addr = socket.local_addr()?;
        info!("Matchmaking server listening on {}", local_addr);

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let receiver = Self::spawn_network_receiver(Arc::clone(&socket), frame_tx);

        Ok(Self {
            socket,
            local_addr,
            frame_rx,
            receiver: Some(receiver),
            sessions: HashMap::new(),
            by_addr: HashMap::new(),
            next_connection_id: 0,
            inbound: VecDeque::new(),
            events: VecDeque::new(),
            last_heartbeat: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that continuously listens for incoming frames
    fn spawn_network_receiver(
        socket: Arc<UdpSocket>,
        frame_tx: mpsc::UnboundedSender<(SocketAddr, TransportFrame)>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match TransportFrame::from_bytes(&buffer[..len]) {
                        Ok(frame) => {
                            if frame_tx.send((addr, frame)).is_err() {
                                debug!("Transport dropped, receive task exiting");
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode frame from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Drains received frames and runs heartbeat and timeout bookkeeping
    fn pump(&mut self) {
        while let Ok((addr, frame)) = self.frame_rx.try_recv() {
            self.handle_frame(addr, frame);
        }

        let now = Instant::now();
        self.expire_sessions(now);

        if now.duration_since(self.last_heartbeat) >= HEARTBEAT_INTERVAL {
            self.last_heartbeat = now;
            let peers: Vec<SocketAddr> = self
                .sessions
                .values()
                .filter(|session| session.state == ConnectionState::Connected)
                .map(|session| session.addr)
                .collect();
            for addr in peers {
                self.send_frame(addr, &TransportFrame::Heartbeat);
            }
        }
    }

    fn handle_frame(&mut self, addr: SocketAddr, frame: TransportFrame) {
        let known = self
            .by_addr
            .get(&addr)
            .copied()
            .filter(|connection| self.sessions.get(connection).map_or(false, Session::is_open));

        match frame {
            TransportFrame::Connect { version } => {
                if version != TRANSPORT_VERSION {
                    warn!(
                        "Rejecting {} with transport version {} (expected {})",
                        addr, version, TRANSPORT_VERSION
                    );
                    self.send_frame(
                        addr,
                        &TransportFrame::Close {
                            reason: "Protocol version mismatch".to_string(),
                        },
                    );
                    return;
                }

                match known {
                    Some(connection) => {
                        // Retransmitted connect; the accept may have been lost
                        let accepted = match self.sessions.get_mut(&connection) {
                            Some(session) => {
                                session.last_seen = Instant::now();
                                session.state == ConnectionState::Connected
                            }
                            None => false,
                        };
                        if accepted {
                            self.send_frame(addr, &TransportFrame::Accept);
                        }
                    }
                    None => self.open_session(addr),
                }
            }
            TransportFrame::Data(data) => match known {
                Some(connection) => {
                    if let Some(session) = self.sessions.get_mut(&connection) {
                        session.last_seen = Instant::now();
                        if session.state == ConnectionState::Connected {
                            self.inbound.push_back(IncomingMessage { connection, data });
                        }
                    }
                }
                None => debug!("Dropping data from unknown peer {}", addr),
            },
            TransportFrame::Heartbeat => {
                if let Some(session) = known.and_then(|c| self.sessions.get_mut(&c)) {
                    session.last_seen = Instant::now();
                }
            }
            TransportFrame::Close { reason } => {
                if let Some(connection) = known {
                    self.end_session(connection, ConnectionState::ClosedByPeer, &reason);
                }
            }
            TransportFrame::Accept => warn!("Unexpected accept frame from {}", addr),
        }
    }

    fn open_session(&mut self, addr: SocketAddr) {
        if let Some(stale) = self.by_addr.remove(&addr) {
            self.sessions.remove(&stale);
        }

        self.next_connection_id = self.next_connection_id.wrapping_add(1);
        let connection = ConnectionId(self.next_connection_id);

        let session = Session {
            addr,
            state: ConnectionState::Connecting,
            name: String::new(),
            last_seen: Instant::now(),
        };
        self.events.push_back(ConnectionStatusChanged {
            connection,
            old_state: ConnectionState::None,
            state: ConnectionState::Connecting,
            description: session.describe(connection),
            end_reason: String::new(),
        });

        self.sessions.insert(connection, session);
        self.by_addr.insert(addr, connection);
    }

    fn expire_sessions(&mut self, now: Instant) {
        let expired: Vec<ConnectionId> = self
            .sessions
            .iter()
            .filter(|(_, session)| {
                session.is_open() && now.duration_since(session.last_seen) > CONNECTION_TIMEOUT
            })
            .map(|(connection, _)| *connection)
            .collect();

        for connection in expired {
            self.end_session(connection, ConnectionState::ProblemDetectedLocally, "Timed out");
        }
    }

    fn end_session(&mut self, connection: ConnectionId, state: ConnectionState, reason: &str) {
        if let Some(session) = self.sessions.get_mut(&connection) {
            if !session.is_open() {
                return;
            }
            let old_state = session.state;
            session.state = state;
            self.events.push_back(ConnectionStatusChanged {
                connection,
                old_state,
                state,
                description: session.describe(connection),
                end_reason: reason.to_string(),
            });
        }
    }

    fn send_frame(&self, addr: SocketAddr, frame: &TransportFrame) {
        if let Err(e) = self.try_send_frame(addr, frame) {
            error!("Failed to send frame to {}: {}", addr, e);
        }
    }

    fn try_send_frame(&self, addr: SocketAddr, frame: &TransportFrame) -> Result<(), TransportError> {
        let bytes = frame.to_bytes()?;
        self.socket.try_send_to(&bytes, addr)?;
        Ok(())
    }
}

impl ServerTransport for UdpServerTransport {
    fn receive_message(&mut self) -> Option<IncomingMessage> {
        self.pump();
        self.inbound.pop_front()
    }

    fn poll_connection_event(&mut self) -> Option<ConnectionStatusChanged> {
        self.pump();
        self.events.pop_front()
    }

    fn accept_connection(&mut self, connection: ConnectionId) -> Result<(), TransportError> {
        let session = self
            .sessions
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;

        if session.state != ConnectionState::Connecting {
            return Err(TransportError::NotConnected(connection));
        }
        session.state = ConnectionState::Connected;
        session.last_seen = Instant::now();

        let addr = session.addr;
        self.try_send_frame(addr, &TransportFrame::Accept)
    }

    fn send_message(
        &mut self,
        connection: ConnectionId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let session = self
            .sessions
            .get(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;

        if session.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected(connection));
        }
        self.try_send_frame(session.addr, &TransportFrame::Data(data.to_vec()))
    }

    /// Datagrams already handed to the socket go out in order ahead of the
    /// close frame, so `linger` needs no extra work here.
    fn close_connection(&mut self, connection: ConnectionId, reason: &str, _linger: bool) {
        if let Some(session) = self.sessions.remove(&connection) {
            if self.by_addr.get(&session.addr) == Some(&connection) {
                self.by_addr.remove(&session.addr);
            }
            if session.is_open() {
                self.send_frame(
                    session.addr,
                    &TransportFrame::Close {
                        reason: reason.to_string(),
                    },
                );
            }
            debug!("Closed connection {} ({})", session.describe(connection), reason);
        }
    }

    fn set_connection_name(&mut self, connection: ConnectionId, name: &str) {
        if let Some(session) = self.sessions.get_mut(&connection) {
            session.name = name.to_string();
        }
    }

    fn shutdown(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
        self.sessions.clear();
        self.by_addr.clear();
        self.inbound.clear();
        self.events.clear();
        self.frame_rx.close();
        info!("Listen socket {} released", self.local_addr);
    }
}

impl Drop for UdpServerTransport {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}
