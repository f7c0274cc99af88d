// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing for multi-frame messages over TCP.
//!
//! Wire format:
//!
//! ```text
//! +----------------+--------------------------------------------+
//! | Length (4B BE) | Payload                                    |
//! +----------------+--------------------------------------------+
//!
//! Payload: frame count (1B) then per frame: length (4B BE) + bytes
//! ```
//!
//! The outer length covers the payload only. [`FrameCodec`] maintains
//! partial read state so nonblocking streams can be drained incrementally.

use std::io::{self, Read};

use crate::message::Frames;
use crate::net::{NetError, NetResult, MAX_MESSAGE_SIZE};

/// Outer header size (4 bytes message length).
pub const MESSAGE_HEADER_SIZE: usize = 4;

/// Encode frames into a single wire message including the outer length.
/// The frame count is carried in one byte; no protocol comes close to
/// that bound.
pub fn encode_message(frames: &[Vec<u8>]) -> Vec<u8> {
    debug_assert!(frames.len() <= usize::from(u8::MAX));
    let payload_len: usize = 1 + frames.iter().map(|frame| 4 + frame.len()).sum::<usize>();
    let mut out = Vec::with_capacity(MESSAGE_HEADER_SIZE + payload_len);
    out.extend_from_slice(&(payload_len as u32).to_be_bytes());
    out.push(frames.len() as u8);
    for frame in frames {
        out.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        out.extend_from_slice(frame);
    }
    out
}

/// Decode a complete message payload into its frames.
pub fn decode_frames(payload: &[u8]) -> NetResult<Frames> {
    let Some((&count, mut rest)) = payload.split_first() else {
        return Err(NetError::MalformedMessage { reason: "empty payload".into() });
    };
    let mut frames = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        if rest.len() < 4 {
            return Err(NetError::MalformedMessage { reason: "truncated frame length".into() });
        }
        let (len_bytes, tail) = rest.split_at(4);
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        if tail.len() < len {
            return Err(NetError::MalformedMessage { reason: "truncated frame body".into() });
        }
        let (frame, tail) = tail.split_at(len);
        frames.push(frame.to_vec());
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(NetError::MalformedMessage { reason: "trailing bytes after last frame".into() });
    }
    Ok(frames)
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    /// Reading the 4-byte outer length
    ReadingLength { bytes_read: usize },
    /// Reading the message payload
    ReadingBody { expected: usize, bytes_read: usize },
}

impl Default for ReadState {
    fn default() -> Self {
        ReadState::ReadingLength { bytes_read: 0 }
    }
}

/// Incremental message decoder for a nonblocking byte stream.
#[derive(Debug)]
pub struct FrameCodec {
    state: ReadState,
    buffer: Vec<u8>,
    max_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: ReadState::default(),
            buffer: vec![0u8; MESSAGE_HEADER_SIZE],
            max_size,
        }
    }

    /// Reset after a connection error.
    pub fn reset(&mut self) {
        self.state = ReadState::default();
        self.buffer = vec![0u8; MESSAGE_HEADER_SIZE];
    }

    /// Pull bytes from `reader` until a complete message payload is
    /// buffered or the stream would block.
    ///
    /// Returns `Ok(Some(payload))` for each complete message,
    /// `Ok(None)` when the stream has no complete message yet, and
    /// `ErrorKind::UnexpectedEof` when the peer closed the connection.
    pub fn read_message<R: Read>(&mut self, reader: &mut R) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.state {
                ReadState::ReadingLength { bytes_read } => {
                    match reader.read(&mut self.buffer[bytes_read..MESSAGE_HEADER_SIZE]) {
                        Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < MESSAGE_HEADER_SIZE {
                                self.state = ReadState::ReadingLength { bytes_read: total };
                                continue;
                            }
                            let expected = u32::from_be_bytes([
                                self.buffer[0],
                                self.buffer[1],
                                self.buffer[2],
                                self.buffer[3],
                            ]) as usize;
                            if expected == 0 || expected > self.max_size {
                                return Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    format!("message length {} out of bounds", expected),
                                ));
                            }
                            self.buffer = vec![0u8; expected];
                            self.state = ReadState::ReadingBody { expected, bytes_read: 0 };
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => return Err(err),
                    }
                }
                ReadState::ReadingBody { expected, bytes_read } => {
                    match reader.read(&mut self.buffer[bytes_read..expected]) {
                        Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < expected {
                                self.state = ReadState::ReadingBody { expected, bytes_read: total };
                                continue;
                            }
                            let payload = std::mem::replace(&mut self.buffer, vec![0u8; MESSAGE_HEADER_SIZE]);
                            self.state = ReadState::default();
                            return Ok(Some(payload));
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }
}
