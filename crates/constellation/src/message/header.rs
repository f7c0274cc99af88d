// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Common message header shared by CSCP, CMDP and CDTP.

use std::time::SystemTime;

use crate::config::Dictionary;
use crate::message::{MessageError, MessageResult};
use crate::protocol::pack::{PackReader, PackWriter};
use crate::protocol::Protocol;

/// Header fields common to all framed protocols: protocol identifier,
/// sender canonical name, send time and a tag dictionary.
///
/// Encoded as four consecutive MessagePack values in a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    protocol: Protocol,
    sender: String,
    time: SystemTime,
    tags: Dictionary,
}

impl Header {
    pub fn new(protocol: Protocol, sender: impl Into<String>) -> Self {
        Self {
            protocol,
            sender: sender.into(),
            time: SystemTime::now(),
            tags: Dictionary::new(),
        }
    }

    pub fn with_time(protocol: Protocol, sender: impl Into<String>, time: SystemTime) -> Self {
        Self { protocol, sender: sender.into(), time, tags: Dictionary::new() }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
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

    /// Encode this header into a frame.
    pub fn assemble(&self) -> Vec<u8> {
        let mut writer = PackWriter::new();
        self.pack(&mut writer);
        writer.into_bytes()
    }

    pub(crate) fn pack(&self, writer: &mut PackWriter) {
        // The identifier bytes include the version byte and are packed as a
        // string, matching the reference encoding.
        writer.put_str(std::str::from_utf8(self.protocol.identifier()).unwrap_or(""));
        writer.put_str(&self.sender);
        writer.put_timestamp(self.time);
        self.tags.pack(writer);
    }

    /// Decode a header frame, insisting on `expected` as protocol.
    pub fn disassemble(expected: Protocol, data: &[u8]) -> MessageResult<Header> {
        let mut reader = PackReader::new(data);
        let header = Self::unpack(expected, &mut reader)?;
        Ok(header)
    }

    pub(crate) fn unpack(expected: Protocol, reader: &mut PackReader<'_>) -> MessageResult<Header> {
        let identifier = reader.get_str()?;
        let protocol = Protocol::from_identifier(identifier.as_bytes())
            .ok_or_else(|| MessageError::invalid_protocol(identifier.as_bytes()))?;
        if protocol != expected {
            return Err(MessageError::UnexpectedProtocol {
                received: protocol.readable(),
                expected: expected.readable(),
            });
        }
        let sender = reader.get_str()?;
        let time = reader.get_timestamp()?;
        let tags = Dictionary::unpack(reader)?;
        Ok(Header { protocol, sender, time, tags })
    }
}
