// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CDTP data transmission messages: an extended header frame followed by
//! one or more opaque payload frames.
//!
//! The header extends the common fields with a sequence number and a record
//! type. BOR (begin-of-run) and EOR (end-of-run) records carry a dictionary
//! payload with the run configuration and run metadata respectively.

use std::time::SystemTime;

use crate::config::Dictionary;
use crate::message::{Frames, MessageError, MessageResult};
use crate::protocol::pack::{PackReader, PackWriter};
use crate::protocol::Protocol;

/// Record type of a CDTP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CdtpType {
    Data = 0x00,
    Bor = 0x01,
    Eor = 0x02,
}

impl CdtpType {
    pub fn from_u8(value: u8) -> Option<CdtpType> {
        match value {
            0x00 => Some(CdtpType::Data),
            0x01 => Some(CdtpType::Bor),
            0x02 => Some(CdtpType::Eor),
            _ => None,
        }
    }
}

/// A CDTP message with its extended header and payload frames.
#[derive(Debug, Clone)]
pub struct CdtpMessage {
    sender: String,
    time: SystemTime,
    tags: Dictionary,
    sequence: u64,
    record_type: CdtpType,
    payload: Frames,
}

impl CdtpMessage {
    pub fn new(sender: impl Into<String>, sequence: u64, record_type: CdtpType) -> Self {
        Self {
            sender: sender.into(),
            time: SystemTime::now(),
            tags: Dictionary::new(),
            sequence,
            record_type,
            payload: Vec::new(),
        }
    }

    /// Begin-of-run record carrying the run configuration.
    pub fn begin_of_run(sender: impl Into<String>, run_config: &Dictionary) -> Self {
        let mut msg = Self::new(sender, 0, CdtpType::Bor);
        msg.add_payload(run_config.to_bytes());
        msg
    }

    /// End-of-run record carrying run metadata.
    pub fn end_of_run(sender: impl Into<String>, sequence: u64, metadata: &Dictionary) -> Self {
        let mut msg = Self::new(sender, sequence, CdtpType::Eor);
        msg.add_payload(metadata.to_bytes());
        msg
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn time(&self) -> SystemTime {
        self.time
    }

    pub fn tags(&self) -> &Dictionary {
        &self.tags
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<crate::config::Value>) {
        self.tags.insert(key, value);
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn record_type(&self) -> CdtpType {
        self.record_type
    }

    pub fn payload(&self) -> &[Vec<u8>] {
        &self.payload
    }

    pub fn add_payload(&mut self, frame: Vec<u8>) {
        self.payload.push(frame);
    }

    /// Decode a BOR/EOR dictionary payload.
    pub fn payload_dictionary(&self) -> MessageResult<Dictionary> {
        let frame = self.payload.first().ok_or(MessageError::IncorrectFrameCount)?;
        Ok(Dictionary::from_bytes(frame)?)
    }

    pub fn assemble(&self) -> Frames {
        let mut writer = PackWriter::new();
        writer.put_str(std::str::from_utf8(Protocol::Cdtp1.identifier()).unwrap_or(""));
        writer.put_str(&self.sender);
        writer.put_timestamp(self.time);
        writer.put_u64(u64::from(self.record_type as u8));
        writer.put_u64(self.sequence);
        self.tags.pack(&mut writer);

        let mut frames = Vec::with_capacity(1 + self.payload.len());
        frames.push(writer.into_bytes());
        frames.extend(self.payload.iter().cloned());
        frames
    }

    pub fn disassemble(frames: &[Vec<u8>]) -> MessageResult<CdtpMessage> {
        // Header plus at least one payload frame
        if frames.len() < 2 {
            return Err(MessageError::IncorrectFrameCount);
        }
        let mut reader = PackReader::new(&frames[0]);

        let identifier = reader.get_str()?;
        let protocol = Protocol::from_identifier(identifier.as_bytes())
            .ok_or_else(|| MessageError::invalid_protocol(identifier.as_bytes()))?;
        if protocol != Protocol::Cdtp1 {
            return Err(MessageError::UnexpectedProtocol {
                received: protocol.readable(),
                expected: Protocol::Cdtp1.readable(),
            });
        }

        let sender = reader.get_str()?;
        let time = reader.get_timestamp()?;
        let type_byte = reader.get_u64()?;
        let record_type = u8::try_from(type_byte)
            .ok()
            .and_then(CdtpType::from_u8)
            .ok_or_else(|| MessageError::DecodeFailure {
                reason: format!("unknown CDTP record type {}", type_byte),
            })?;
        let sequence = reader.get_u64()?;
        let tags = Dictionary::unpack(&mut reader)?;

        Ok(CdtpMessage {
            sender,
            time,
            tags,
            sequence,
            record_type,
            payload: frames[1..].to_vec(),
        })
    }
}
