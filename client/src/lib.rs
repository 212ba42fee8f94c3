//! # Matchmaking Client Library
//!
//! Console counterpart of the matchmaking server. It connects over UDP,
//! finds or creates a lobby, relays chat, and prints the game server
//! address once the lobby fills.
//!
//! ## Module Organization
//!
//! - `input`: parses console lines into [`input::ClientCommand`]s
//! - `session`: lobby membership and pending game server, free of I/O
//! - `network`: socket, connect retries, heartbeats and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use lobby_client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = "127.0.0.1:27055".parse()?;
//!     let mut client = Client::new(server, Some("Gordon".to_string()), true).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
pub mod session;
