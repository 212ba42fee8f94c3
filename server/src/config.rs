//! Runtime configuration owned by the dispatch loop
//!
//! Seeded from the command line at startup and changed afterwards only by
//! operator console commands.

use lobby_shared::{parse_address, AddressError, DEFAULT_GAME_SERVER_PORT};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_QUORUM: usize = 2;
pub const DEFAULT_TICK_RATE: u32 = 100;
pub const DEFAULT_RCON_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid quorum '{0}': expected a whole number of at least 1")]
    InvalidQuorum(String),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("invalid tick rate {0}: expected 1 to 1000 Hz")]
    InvalidTickRate(u32),
    #[error("invalid RCON timeout {0} ms: expected at least 1 ms")]
    InvalidRconTimeout(u64),
}

/// A game server commanded over its remote console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameServerTarget {
    pub address: IpAddr,
    pub port: u16,
    pub rcon_password: String,
}

impl GameServerTarget {
    /// Parses `ip[:port]`, defaulting the port to the game server port
    pub fn parse(input: &str, rcon_password: &str) -> Result<Self, ConfigError> {
        let addr = parse_address(input, DEFAULT_GAME_SERVER_PORT)?;
        Ok(Self {
            address: addr.ip(),
            port: addr.port(),
            rcon_password: rcon_password.to_string(),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// `host:port` string handed to players; IPv6 hosts are bracketed
    pub fn connect_string(&self) -> String {
        self.socket_addr().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Member count at which a lobby is launched
    pub quorum: usize,
    /// Launch targets in registration order; the front one is used
    pub game_servers: Vec<GameServerTarget>,
    /// Password given to targets added at runtime
    pub rcon_password: String,
    pub rcon_timeout: Duration,
    pub tick_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            game_servers: Vec::new(),
            rcon_password: String::new(),
            rcon_timeout: DEFAULT_RCON_TIMEOUT,
            tick_interval: tick_interval_for(DEFAULT_TICK_RATE).unwrap_or(Duration::from_millis(10)),
        }
    }
}

/// Converts a tick rate in Hz into the loop interval
pub fn tick_interval_for(rate_hz: u32) -> Result<Duration, ConfigError> {
    if rate_hz == 0 || rate_hz > 1000 {
        return Err(ConfigError::InvalidTickRate(rate_hz));
    }
    Ok(Duration::from_micros(1_000_000 / rate_hz as u64))
}

/// Converts the RCON timeout in milliseconds, which must be non-zero
pub fn rcon_timeout_for(millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::InvalidRconTimeout(millis));
    }
    Ok(Duration::from_millis(millis))
}

pub fn parse_quorum(input: &str) -> Result<usize, ConfigError> {
    match input.trim().parse::<usize>() {
        Ok(quorum) if quorum >= 1 => Ok(quorum),
        _ => Err(ConfigError::InvalidQuorum(input.trim().to_string())),
    }
}

impl ServerConfig {
    /// Applies an operator-supplied quorum; nothing changes on error
    pub fn set_quorum_from_str(&mut self, input: &str) -> Result<usize, ConfigError> {
        let quorum = parse_quorum(input)?;
        self.quorum = quorum;
        Ok(quorum)
    }

    /// Appends a launch target parsed from `ip[:port]`
    pub fn add_game_server(&mut self, input: &str) -> Result<&GameServerTarget, ConfigError> {
        let target = GameServerTarget::parse(input, &self.rcon_password)?;
        self.game_servers.push(target);
        let index = self.game_servers.len() - 1;
        Ok(&self.game_servers[index])
    }

    /// The target every launch goes to
    pub fn launch_target(&self) -> Option<&GameServerTarget> {
        self.game_servers.first()
    }
}
