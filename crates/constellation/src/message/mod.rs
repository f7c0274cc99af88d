// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message types of the four wire protocols.
//!
//! Every message assembles into an ordered list of opaque frames and
//! disassembles from one, validating the protocol identifier, frame count
//! and header encoding. Disassembly never panics; malformed input surfaces
//! as a [`MessageError`] whose `Display` string is what CSCP error replies
//! carry on the wire.

mod cdtp;
mod chp;
mod cmdp;
mod cscp;
mod header;

pub use cdtp::{CdtpMessage, CdtpType};
pub use chp::ChpMessage;
pub use cmdp::{CmdpMessage, CmdpTopic, LogLevel};
pub use cscp::{CscpMessage, CscpType};
pub use header::Header;

use std::fmt;

use crate::protocol::pack::PackError;
use crate::protocol::readable_identifier;

/// A multi-frame wire message: ordered opaque frames.
pub type Frames = Vec<Vec<u8>>;

/// Error produced while disassembling a received message.
#[derive(Debug, Clone)]
pub enum MessageError {
    /// The protocol identifier is not known to this implementation.
    InvalidProtocol { identifier: String },
    /// A valid identifier, but not the protocol this endpoint speaks.
    UnexpectedProtocol { received: String, expected: String },
    /// The number of frames does not match the protocol layout.
    IncorrectFrameCount,
    /// A frame failed to decode.
    DecodeFailure { reason: String },
}

impl MessageError {
    pub(crate) fn invalid_protocol(identifier: &[u8]) -> Self {
        MessageError::InvalidProtocol { identifier: readable_identifier(identifier) }
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::InvalidProtocol { identifier } => {
                write!(f, "Invalid protocol identifier \"{}\"", identifier)
            }
            MessageError::UnexpectedProtocol { received, expected } => {
                write!(f, "Received protocol \"{}\" does not match expected identifier \"{}\"", received, expected)
            }
            MessageError::IncorrectFrameCount => f.write_str("Incorrect number of message frames"),
            MessageError::DecodeFailure { reason } => write!(f, "Message decoding failed: {}", reason),
        }
    }
}

impl std::error::Error for MessageError {}

impl From<PackError> for MessageError {
    fn from(err: PackError) -> Self {
        MessageError::DecodeFailure { reason: err.to_string() }
    }
}

pub type MessageResult<T> = core::result::Result<T, MessageError>;
