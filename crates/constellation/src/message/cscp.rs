// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CSCP control messages: a header frame, a verb frame and an optional
//! payload frame.

use std::fmt;

use crate::message::{Frames, Header, MessageError, MessageResult};
use crate::protocol::pack::{PackReader, PackWriter};
use crate::protocol::Protocol;

/// Type byte of a CSCP message verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CscpType {
    /// Request with a command
    Request = 0x00,
    /// Command is being executed
    Success = 0x01,
    /// Command is valid but not implemented
    NotImplemented = 0x02,
    /// Command is valid but mandatory payload information is missing or incorrectly formatted
    Incomplete = 0x03,
    /// Command is invalid for the current state
    Invalid = 0x04,
    /// Command is entirely unknown
    Unknown = 0x05,
    /// Previously received message is invalid
    Error = 0x06,
}

impl CscpType {
    pub fn from_u8(value: u8) -> Option<CscpType> {
        match value {
            0x00 => Some(CscpType::Request),
            0x01 => Some(CscpType::Success),
            0x02 => Some(CscpType::NotImplemented),
            0x03 => Some(CscpType::Incomplete),
            0x04 => Some(CscpType::Invalid),
            0x05 => Some(CscpType::Unknown),
            0x06 => Some(CscpType::Error),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CscpType::Request => "REQUEST",
            CscpType::Success => "SUCCESS",
            CscpType::NotImplemented => "NOTIMPLEMENTED",
            CscpType::Incomplete => "INCOMPLETE",
            CscpType::Invalid => "INVALID",
            CscpType::Unknown => "UNKNOWN",
            CscpType::Error => "ERROR",
        }
    }
}

impl fmt::Display for CscpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A CSCP request or reply.
#[derive(Debug, Clone)]
pub struct CscpMessage {
    header: Header,
    verb_type: CscpType,
    verb: String,
    payload: Option<Vec<u8>>,
}

impl CscpMessage {
    pub fn new(sender: impl Into<String>, verb_type: CscpType, verb: impl Into<String>) -> Self {
        Self {
            header: Header::new(Protocol::Cscp1, sender),
            verb_type,
            verb: verb.into(),
            payload: None,
        }
    }

    /// Convenience constructor for a REQUEST with a command verb.
    pub fn request(sender: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(sender, CscpType::Request, command)
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = if payload.is_empty() { None } else { Some(payload) };
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn verb_type(&self) -> CscpType {
        self.verb_type
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Assemble into wire frames: header, verb, optional payload.
    pub fn assemble(&self) -> Frames {
        let mut frames = Vec::with_capacity(3);
        frames.push(self.header.assemble());

        let mut body = PackWriter::new();
        body.put_u64(u64::from(self.verb_type as u8));
        body.put_str(&self.verb);
        frames.push(body.into_bytes());

        if let Some(payload) = &self.payload {
            frames.push(payload.clone());
        }
        frames
    }

    /// Disassemble from received frames.
    pub fn disassemble(frames: &[Vec<u8>]) -> MessageResult<CscpMessage> {
        if frames.len() < 2 || frames.len() > 3 {
            return Err(MessageError::IncorrectFrameCount);
        }
        let header = Header::disassemble(Protocol::Cscp1, &frames[0])?;

        let mut body = PackReader::new(&frames[1]);
        let type_byte = body.get_u64()?;
        let verb_type = u8::try_from(type_byte)
            .ok()
            .and_then(CscpType::from_u8)
            .ok_or_else(|| MessageError::DecodeFailure {
                reason: format!("unknown CSCP message type {}", type_byte),
            })?;
        let verb = body.get_str()?;

        let payload = frames.get(2).filter(|frame| !frame.is_empty()).cloned();
        Ok(CscpMessage { header, verb_type, verb, payload })
    }
}
