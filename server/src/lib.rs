//! # Matchmaking Server Library
//!
//! Rendezvous server that groups connected players into lobbies and hands
//! each full lobby off to a game server.
//!
//! ## Core Responsibilities
//!
//! ### Connection Registry
//! Every accepted connection gets a random temporary nickname that the
//! player may change with the chat command `/nick`. Joins, renames and
//! departures are announced to everybody else.
//!
//! ### Lobby Registry
//! Players list, create, join and leave lobbies and exchange lobby metadata
//! (map and team mode). A connection is in at most one lobby at a time and
//! a lobby disappears as soon as its last member leaves.
//!
//! ### Game Launch
//! Once a lobby holds at least `quorum` members, the server configures the
//! front game server over RCON (`mp_teamplay`, `changelevel`) and sends every
//! member a `startGame` message carrying the server's `host:port`.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Dispatch Loop
//! [`network::Server`] owns every registry and runs one tick at a time:
//! quorum check, client messages, connection events, operator commands. No
//! registry is shared, so none needs a lock. The only cross-thread structure
//! is the operator line queue filled by the stdin reader thread.
//!
//! ### Pluggable Transport
//! The loop talks to clients through [`transport::ServerTransport`]. The
//! binary uses [`transport::UdpServerTransport`]; tests drive the server
//! through [`transport::MemoryTransport`].
//!
//! ## Module Organization
//!
//! - `transport`: transport trait plus UDP and in-memory implementations
//! - `client_manager`: connection registry and nickname generation
//! - `lobby`: lobby registry and membership rules
//! - `chat`: `/nick` parsing and server chat text
//! - `launch`, `rcon`: game-launch gateway and the Source RCON client
//! - `config`: runtime configuration and its validation
//! - `console`: operator console queue and command parser
//! - `network`: the dispatch loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use lobby_server::config::ServerConfig;
//! use lobby_server::console::ConsoleQueue;
//! use lobby_server::network::Server;
//! use lobby_server::rcon::SourceRcon;
//! use lobby_server::transport::UdpServerTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = UdpServerTransport::bind("0.0.0.0:27055".parse()?).await?;
//!     let config = ServerConfig::default();
//!     let remote = SourceRcon::new(config.rcon_timeout);
//!
//!     let console = ConsoleQueue::new();
//!     console.spawn_stdin_reader()?;
//!
//!     let mut server = Server::new(transport, config, remote, console);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod client_manager;
pub mod config;
pub mod console;
pub mod launch;
pub mod lobby;
pub mod network;
pub mod rcon;
pub mod transport;
