//! # Matchmaking Shared Library
//!
//! Definitions both ends of the matchmaking service must agree on: the
//! one-byte-tag message envelope and its payload records, the map and team
//! mode enums, the datagram session frames, and a handful of defaults.
//!
//! ## Modules
//!
//! - `protocol`: tag enum, raw envelope codec and the typed [`Message`] layer
//! - `frame`: connect/accept/data/heartbeat/close frames for the UDP transport
//! - `error`: error types for all of the above

pub mod error;
pub mod frame;
pub mod protocol;

pub use error::{AddressError, FrameError, ProtocolError};
pub use frame::{TransportFrame, TRANSPORT_VERSION};
pub use protocol::{GameMap, LobbyData, LobbyId, Message, MessageTag, TeamMode};

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Port the matchmaking server listens on by default
pub const DEFAULT_SERVER_PORT: u16 = 27055;

/// Game server port assumed when a launch target is given without one
pub const DEFAULT_GAME_SERVER_PORT: u16 = 27015;

/// Largest datagram either side will send or accept
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Longest chat payload the server will relay, leaving room for framing
pub const MAX_CHAT_LEN: usize = MAX_DATAGRAM_SIZE - 64;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Silence after which a session is considered lost
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Parses `ip` or `ip:port` (IPv6 with a port must be bracketed).
///
/// A missing port, or an explicit port of 0, falls back to `default_port`.
pub fn parse_address(input: &str, default_port: u16) -> Result<SocketAddr, AddressError> {
    let trimmed = input.trim();

    let mut addr = match trimmed.parse::<SocketAddr>() {
        Ok(addr) => addr,
        Err(_) => {
            let bare = trimmed.trim_start_matches('[').trim_end_matches(']');
            let ip = bare
                .parse::<IpAddr>()
                .map_err(|_| AddressError(trimmed.to_string()))?;
            SocketAddr::new(ip, default_port)
        }
    };

    if addr.port() == 0 {
        addr.set_port(default_port);
    }

    Ok(addr)
}
