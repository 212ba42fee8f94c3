//! Source RCON client used to command game servers
//!
//! Packets are little-endian: `size: i32`, `id: i32`, `kind: i32`, the body,
//! then two NUL bytes. `size` counts everything after itself.

use crate::config::GameServerTarget;
use log::debug;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Id the server puts in the auth response when the password is wrong
const AUTH_FAILED_ID: i32 = -1;

/// id + kind + two terminators
const MIN_PACKET_SIZE: i32 = 10;
const MAX_PACKET_SIZE: i32 = 4096 + MIN_PACKET_SIZE;

/// Responses skipped while waiting for the expected one
const MAX_UNRELATED_PACKETS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum RconError {
    #[error("rcon i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("rcon password rejected by {0}")]
    AuthRejected(SocketAddr),
    #[error("malformed rcon packet: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl RconPacket {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let size = MIN_PACKET_SIZE + body.len() as i32;

        let mut bytes = Vec::with_capacity(size as usize + 4);
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&self.id.to_le_bytes());
        bytes.extend_from_slice(&self.kind.to_le_bytes());
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), RconError> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, RconError> {
        let mut size_bytes = [0u8; 4];
        reader.read_exact(&mut size_bytes)?;
        let size = i32::from_le_bytes(size_bytes);

        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(RconError::Malformed(format!("packet size {}", size)));
        }

        let mut rest = vec![0u8; size as usize];
        reader.read_exact(&mut rest)?;

        let id = i32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let kind = i32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]);
        let body = &rest[8..rest.len() - 2];
        let body = match body.iter().position(|&b| b == 0) {
            Some(end) => &body[..end],
            None => body,
        };

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

/// Sends the password and waits for the auth response
pub fn authenticate<S: Read + Write>(
    stream: &mut S,
    peer: SocketAddr,
    id: i32,
    password: &str,
) -> Result<(), RconError> {
    RconPacket::new(id, SERVERDATA_AUTH, password).write_to(stream)?;

    // Source servers send an empty response value ahead of the auth response
    for _ in 0..MAX_UNRELATED_PACKETS {
        let packet = RconPacket::read_from(stream)?;
        if packet.kind != SERVERDATA_AUTH_RESPONSE {
            continue;
        }
        if packet.id == AUTH_FAILED_ID {
            return Err(RconError::AuthRejected(peer));
        }
        return Ok(());
    }

    Err(RconError::Malformed("no auth response".to_string()))
}

/// Runs one command and returns the response body
pub fn execute_command<S: Read + Write>(
    stream: &mut S,
    id: i32,
    command: &str,
) -> Result<String, RconError> {
    RconPacket::new(id, SERVERDATA_EXECCOMMAND, command).write_to(stream)?;

    for _ in 0..MAX_UNRELATED_PACKETS {
        let packet = RconPacket::read_from(stream)?;
        if packet.kind == SERVERDATA_RESPONSE_VALUE && packet.id == id {
            return Ok(packet.body);
        }
        debug!("Skipping rcon packet id {} kind {}", packet.id, packet.kind);
    }

    Err(RconError::Malformed(format!("no response to '{}'", command)))
}

/// Remote console of a game server
pub trait RemoteConsole {
    fn execute(&mut self, target: &GameServerTarget, command: &str) -> Result<String, RconError>;
}

/// RCON over TCP with bounded connect, read and write times
///
/// The authenticated connection is kept for the next command to the same
/// target and dropped on any error.
pub struct SourceRcon {
    timeout: Duration,
    session: Option<(SocketAddr, TcpStream)>,
    next_id: i32,
}

impl SourceRcon {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            session: None,
            next_id: 1,
        }
    }

    fn request_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if self.next_id >= i32::MAX { 1 } else { self.next_id + 1 };
        id
    }

    fn connect(&mut self, target: &GameServerTarget) -> Result<TcpStream, RconError> {
        let peer = target.socket_addr();
        let mut stream = TcpStream::connect_timeout(&peer, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let id = self.request_id();
        authenticate(&mut stream, peer, id, &target.rcon_password)?;
        debug!("Authenticated rcon session with {}", peer);
        Ok(stream)
    }
}

impl RemoteConsole for SourceRcon {
    fn execute(&mut self, target: &GameServerTarget, command: &str) -> Result<String, RconError> {
        let peer = target.socket_addr();
        let mut stream = match self.session.take() {
            Some((addr, stream)) if addr == peer => stream,
            _ => self.connect(target)?,
        };

        let id = self.request_id();
        let response = execute_command(&mut stream, id, command)?;
        self.session = Some((peer, stream));
        Ok(response)
    }
}
