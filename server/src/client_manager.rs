//! Connection registry for the matchmaking server
//!
//! This module tracks every connection the transport has accepted, including:
//! - The nickname shown in chat, randomized on connect
//! - Renames requested through the chat `/nick` command
//! - Removal when the transport reports the connection closed
//!
//! Nicknames are not unique. The registry never talks to the transport: the
//! dispatch loop turns each change into chat notifications for the others.

use crate::transport::ConnectionId;
use log::info;
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;

/// Prefix of every generated nickname
pub const NICKNAME_PREFIX: &str = "Player";

/// Longest nickname accepted from `/nick`, in bytes
pub const MAX_NICKNAME_LEN: usize = 32;

/// A player's name as the raw bytes the client chose
///
/// Clients may use any 8-bit encoding, so the bytes are kept as sent and
/// only decoded (lossily) for log output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Nickname(Vec<u8>);

impl Nickname {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Nickname {
    fn from(bytes: &[u8]) -> Self {
        Nickname(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Nickname {
    fn from(bytes: Vec<u8>) -> Self {
        Nickname(bytes)
    }
}

impl From<&str> for Nickname {
    fn from(text: &str) -> Self {
        Nickname(text.as_bytes().to_vec())
    }
}

impl From<String> for Nickname {
    fn from(text: String) -> Self {
        Nickname(text.into_bytes())
    }
}

impl PartialEq<str> for Nickname {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Nickname {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Per-connection state kept by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Name shown to other players in chat and lobby listings
    pub nickname: Nickname,
}

impl ClientInfo {
    pub fn new(nickname: impl Into<Nickname>) -> Self {
        Self {
            nickname: nickname.into(),
        }
    }
}

/// Generates a temporary nickname such as `Player48213`
///
/// The numeric part is drawn from `10000..110000`, so it always has five or
/// six digits.
pub fn generate_nickname<R: Rng + ?Sized>(rng: &mut R) -> Nickname {
    Nickname::from(format!("{}{}", NICKNAME_PREFIX, rng.gen_range(10_000..110_000)))
}

/// Manages all accepted connections and their nicknames
///
/// Iteration order is connection-id order, which keeps rosters and
/// broadcasts deterministic.
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: BTreeMap<ConnectionId, ClientInfo>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection under a random nickname
    ///
    /// Returns the nickname assigned. Registering the same connection twice
    /// replaces the previous record.
    pub fn add_client<R: Rng + ?Sized>(&mut self, connection: ConnectionId, rng: &mut R) -> Nickname {
        let nickname = generate_nickname(rng);
        info!("Client {} connected as {}", connection, nickname);
        self.clients
            .insert(connection, ClientInfo::new(nickname.clone()));
        nickname
    }

    /// Overwrites the nickname of a known connection
    ///
    /// Returns the previous nickname, or None if the connection is unknown.
    pub fn rename(&mut self, connection: ConnectionId, nickname: &Nickname) -> Option<Nickname> {
        let client = self.clients.get_mut(&connection)?;
        let previous = std::mem::replace(&mut client.nickname, nickname.clone());
        info!("Client {} renamed from {} to {}", connection, previous, nickname);
        Some(previous)
    }

    /// Removes a connection from the registry
    ///
    /// Returns the record that was removed so callers can still name the
    /// departed player.
    pub fn remove_client(&mut self, connection: ConnectionId) -> Option<ClientInfo> {
        let removed = self.clients.remove(&connection);
        if let Some(client) = &removed {
            info!("Client {} ({}) disconnected", connection, client.nickname);
        }
        removed
    }

    pub fn get(&self, connection: ConnectionId) -> Option<&ClientInfo> {
        self.clients.get(&connection)
    }

    pub fn nickname(&self, connection: ConnectionId) -> Option<&Nickname> {
        self.clients.get(&connection).map(|client| &client.nickname)
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.clients.contains_key(&connection)
    }

    /// All known connections in id order
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.clients.keys().copied().collect()
    }

    /// Every known connection except `excluded`, used for notifications
    /// that must never reach their subject
    pub fn connections_except(&self, excluded: ConnectionId) -> Vec<ConnectionId> {
        self.clients
            .keys()
            .copied()
            .filter(|connection| *connection != excluded)
            .collect()
    }

    /// `(connection, nickname)` pairs in id order
    pub fn roster(&self) -> impl Iterator<Item = (ConnectionId, &Nickname)> + '_ {
        self.clients
            .iter()
            .map(|(connection, client)| (*connection, &client.nickname))
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&mut self) {
        self.clients.clear();
    }
}
