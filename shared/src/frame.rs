//! Session framing used by the datagram transport
//!
//! The matchmaking protocol assumes a connection-oriented, message-oriented
//! transport. Over plain UDP that session layer is provided by these frames:
//! application envelopes ride inside [`TransportFrame::Data`].

use crate::error::FrameError;
use crate::MAX_DATAGRAM_SIZE;
use bincode::{deserialize, serialize};
use serde::{Deserialize, Serialize};

/// Version carried by `Connect`; the server rejects mismatches
pub const TRANSPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportFrame {
    Connect { version: u32 },
    Accept,
    Data(Vec<u8>),
    Heartbeat,
    Close { reason: String },
}

impl TransportFrame {
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let bytes = serialize(self)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(FrameError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(deserialize(bytes)?)
    }
}
