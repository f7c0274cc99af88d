// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber side of the pub/sub substrate.
//!
//! A `SubSocket` is a nonblocking stream meant to be registered with the
//! owning pool's poller. Subscriptions are prefix-based control messages
//! sent upstream to the publisher; received messages are drained with
//! [`SubSocket::recv`] after a readable event.

use std::io::{self, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;

use crate::message::Frames;
use crate::net::framing::{decode_frames, encode_message, FrameCodec};
use crate::net::{NetError, NetResult, CONTROL_SUBSCRIBE, CONTROL_UNSUBSCRIBE};

/// Subscribing socket connected to one publisher.
#[derive(Debug)]
pub struct SubSocket {
    stream: TcpStream,
    codec: FrameCodec,
    /// Control bytes not yet accepted by the kernel (pre-connect or
    /// backpressure); flushed on writable events.
    pending: Vec<u8>,
    pending_pos: usize,
}

impl SubSocket {
    /// Start a nonblocking connect to a publisher endpoint.
    pub fn connect(addr: SocketAddr) -> io::Result<SubSocket> {
        let stream = TcpStream::connect(addr)?;
        Ok(SubSocket {
            stream,
            codec: FrameCodec::default(),
            pending: Vec::new(),
            pending_pos: 0,
        })
    }

    /// The mio source to register with a poller.
    pub fn source(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Subscribe to a topic prefix. The empty prefix subscribes to all.
    pub fn subscribe(&mut self, topic: &[u8]) -> io::Result<()> {
        self.send_control(CONTROL_SUBSCRIBE, topic)
    }

    /// Unsubscribe from a topic prefix.
    pub fn unsubscribe(&mut self, topic: &[u8]) -> io::Result<()> {
        self.send_control(CONTROL_UNSUBSCRIBE, topic)
    }

    fn send_control(&mut self, control: u8, topic: &[u8]) -> io::Result<()> {
        let mut frame = Vec::with_capacity(1 + topic.len());
        frame.push(control);
        frame.extend_from_slice(topic);
        let wire = encode_message(&[frame]);
        self.pending.extend_from_slice(&wire);
        self.flush()
    }

    /// Push buffered control bytes towards the publisher. Call on writable
    /// events; a `WouldBlock` mid-write leaves the remainder buffered.
    pub fn flush(&mut self) -> io::Result<()> {
        while self.pending_pos < self.pending.len() {
            match self.stream.write(&self.pending[self.pending_pos..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.pending_pos += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                // Connect still in progress: keep the bytes buffered
                Err(err) if err.kind() == io::ErrorKind::NotConnected => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        self.pending.clear();
        self.pending_pos = 0;
        Ok(())
    }

    /// Drain one complete message, if buffered. Returns
    /// [`NetError::Disconnected`] when the publisher closed the stream.
    pub fn recv(&mut self) -> NetResult<Option<Frames>> {
        match self.codec.read_message(&mut self.stream) {
            Ok(Some(payload)) => Ok(Some(decode_frames(&payload)?)),
            Ok(None) => Ok(None),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(NetError::Disconnected),
            Err(err) => Err(NetError::Io(err)),
        }
    }
}
