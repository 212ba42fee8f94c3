//! Error types shared by the matchmaking client and server

use crate::protocol::MessageTag;

/// Failures decoding an application envelope
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("invalid payload length {len} for {tag:?}")]
    PayloadLength { tag: MessageTag, len: usize },
    #[error("unknown map ordinal {0}")]
    UnknownMap(i32),
}

/// Failures encoding or decoding a datagram transport frame
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the datagram limit")]
    TooLarge(usize),
}

/// An address string that is neither `ip` nor `ip:port`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address '{0}'")]
pub struct AddressError(pub String);
