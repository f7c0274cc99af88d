// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CHP heartbeat messages: a single frame carrying sender, time, state and
//! the maximum interval until the next message.

use std::time::{Duration, SystemTime};

use crate::message::{Frames, MessageError, MessageResult};
use crate::protocol::pack::{PackReader, PackWriter};
use crate::protocol::{Protocol, State};

/// A CHP heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChpMessage {
    sender: String,
    time: SystemTime,
    state: State,
    interval: Duration,
}

impl ChpMessage {
    pub fn new(sender: impl Into<String>, state: State, interval: Duration) -> Self {
        Self { sender: sender.into(), time: SystemTime::now(), state, interval }
    }

    pub fn with_time(sender: impl Into<String>, state: State, interval: Duration, time: SystemTime) -> Self {
        Self { sender: sender.into(), time, state, interval }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn time(&self) -> SystemTime {
        self.time
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Maximum interval until the next heartbeat is expected.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn assemble(&self) -> Frames {
        let mut writer = PackWriter::new();
        writer.put_str(std::str::from_utf8(Protocol::Chp1.identifier()).unwrap_or(""));
        writer.put_str(&self.sender);
        writer.put_timestamp(self.time);
        writer.put_u64(u64::from(self.state as u8));
        writer.put_u64(self.interval.as_millis() as u64);
        vec![writer.into_bytes()]
    }

    pub fn disassemble(frames: &[Vec<u8>]) -> MessageResult<ChpMessage> {
        if frames.len() != 1 {
            return Err(MessageError::IncorrectFrameCount);
        }
        let mut reader = PackReader::new(&frames[0]);

        let identifier = reader.get_str()?;
        let protocol = Protocol::from_identifier(identifier.as_bytes())
            .ok_or_else(|| MessageError::invalid_protocol(identifier.as_bytes()))?;
        if protocol != Protocol::Chp1 {
            return Err(MessageError::UnexpectedProtocol {
                received: protocol.readable(),
                expected: Protocol::Chp1.readable(),
            });
        }

        let sender = reader.get_str()?;
        let time = reader.get_timestamp()?;
        let state_byte = reader.get_u64()?;
        let state = u8::try_from(state_byte)
            .ok()
            .and_then(State::from_u8)
            .ok_or_else(|| MessageError::DecodeFailure {
                reason: format!("unknown state byte {:#04x}", state_byte),
            })?;
        let interval = Duration::from_millis(reader.get_u64()?);

        Ok(ChpMessage { sender, time, state, interval })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_roundtrip() {
        let msg = ChpMessage::new("sputnik.one", State::Orbit, Duration::from_millis(5000));
        let frames = msg.assemble();
        assert_eq!(frames.len(), 1);
        let decoded = ChpMessage::disassemble(&frames).unwrap();
        assert_eq!(decoded.sender(), "sputnik.one");
        assert_eq!(decoded.state(), State::Orbit);
        assert_eq!(decoded.interval(), Duration::from_millis(5000));
    }

    #[test]
    fn test_all_states_roundtrip() {
        for byte in 0..=u8::MAX {
            let Some(state) = State::from_u8(byte) else { continue };
            let frames = ChpMessage::new("sat.x", state, Duration::from_millis(100)).assemble();
            assert_eq!(ChpMessage::disassemble(&frames).unwrap().state(), state);
        }
    }

    #[test]
    fn test_reserved_state_byte_is_rejected() {
        let mut writer = PackWriter::new();
        writer.put_str("CHP\x01");
        writer.put_str("sat.x");
        writer.put_timestamp(SystemTime::now());
        writer.put_u64(0x50); // structurally reserved steady value
        writer.put_u64(100);
        let frames = vec![writer.into_bytes()];
        assert!(matches!(ChpMessage::disassemble(&frames), Err(MessageError::DecodeFailure { .. })));
    }

    #[test]
    fn test_wrong_protocol_is_rejected() {
        let mut writer = PackWriter::new();
        writer.put_str("CSCP\x01");
        let frames = vec![writer.into_bytes()];
        assert!(matches!(ChpMessage::disassemble(&frames), Err(MessageError::UnexpectedProtocol { .. })));
    }

    #[test]
    fn test_frame_count() {
        let msg = ChpMessage::new("sat.x", State::New, Duration::from_millis(100));
        let mut frames = msg.assemble();
        frames.push(vec![]);
        assert!(matches!(ChpMessage::disassemble(&frames), Err(MessageError::IncorrectFrameCount)));
    }
}
