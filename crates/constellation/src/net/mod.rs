// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message-oriented socket substrate for the framed protocols.
//!
//! TCP is a stream protocol without message boundaries, so every message is
//! carried as a length-prefixed multi-frame datagram (see [`framing`]). On
//! top of that sit the four socket flavours the fabric needs:
//!
//! - [`PubSocket`] / [`SubSocket`] — pub/sub with prefix subscriptions
//!   (CMDP, CHP, CDTP)
//! - [`RepSocket`] / [`ReqSocket`] — request/reply (CSCP)
//!
//! Endpoints are `tcp://<ipv4>:<port>`; ports are ephemeral and published
//! via CHIRP.

pub mod framing;
mod pubsock;
mod repsock;
mod reqsock;
mod subsock;

pub use framing::{decode_frames, encode_message, FrameCodec};
pub use pubsock::{PubSocket, SubscriptionEvent};
pub use repsock::{ClientId, RepSocket};
pub use reqsock::ReqSocket;
pub use subsock::SubSocket;

use std::fmt;
use std::io;

/// Maximum message size accepted on any substrate socket (anti-OOM guard).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Subscribe control byte sent from subscriber to publisher.
pub(crate) const CONTROL_SUBSCRIBE: u8 = 0x01;
/// Unsubscribe control byte sent from subscriber to publisher.
pub(crate) const CONTROL_UNSUBSCRIBE: u8 = 0x00;

/// Substrate error.
#[derive(Debug)]
pub enum NetError {
    Io(io::Error),
    /// Peer closed the connection.
    Disconnected,
    /// No reply within the caller-supplied deadline.
    Timeout,
    /// Message exceeds [`MAX_MESSAGE_SIZE`].
    MessageTooLarge { size: usize },
    /// Frame table does not match the carried bytes.
    MalformedMessage { reason: String },
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Io(err) => write!(f, "socket error: {}", err),
            NetError::Disconnected => f.write_str("peer disconnected"),
            NetError::Timeout => f.write_str("request timed out"),
            NetError::MessageTooLarge { size } => {
                write!(f, "message of {} bytes exceeds limit of {} bytes", size, MAX_MESSAGE_SIZE)
            }
            NetError::MalformedMessage { reason } => write!(f, "malformed message: {}", reason),
        }
    }
}

impl std::error::Error for NetError {}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            NetError::Disconnected
        } else {
            NetError::Io(err)
        }
    }
}

pub type NetResult<T> = core::result::Result<T, NetError>;

/// Check whether a first frame matches a subscription prefix. The empty
/// prefix matches everything.
pub(crate) fn topic_matches(prefix: &[u8], first_frame: &[u8]) -> bool {
    first_frame.len() >= prefix.len() && &first_frame[..prefix.len()] == prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_prefix_matching() {
        assert!(topic_matches(b"", b"LOG/INFO"));
        assert!(topic_matches(b"", b""));
        assert!(topic_matches(b"LOG/", b"LOG/INFO/FSM"));
        assert!(topic_matches(b"LOG/INFO", b"LOG/INFO"));
        assert!(!topic_matches(b"LOG/INFO", b"LOG/IN"));
        assert!(!topic_matches(b"STAT/", b"LOG/INFO"));
    }
}
