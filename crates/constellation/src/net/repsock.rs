// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reply socket for the CSCP request/reply pattern.
//!
//! Owned and driven by a single worker thread: `recv` polls the listener
//! and all client connections with a bounded timeout, `reply` answers the
//! client a request came from.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::message::Frames;
use crate::net::framing::{decode_frames, encode_message, FrameCodec};

const LISTENER: Token = Token(0);
const FIRST_CONN: usize = 1;

/// How long a reply write may stall before the client is dropped.
const REPLY_DEADLINE: Duration = Duration::from_secs(1);

/// Identifies the client connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientId(usize);

struct RepConn {
    stream: TcpStream,
    codec: FrameCodec,
}

/// Reply socket bound to an ephemeral port.
pub struct RepSocket {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    conns: HashMap<usize, RepConn>,
    next_token: usize,
    pending: VecDeque<(ClientId, Frames)>,
}

impl RepSocket {
    /// Bind on an ephemeral port.
    pub fn bind() -> io::Result<RepSocket> {
        let addr: SocketAddr = "0.0.0.0:0".parse().map_err(|_| io::ErrorKind::InvalidInput)?;
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        Ok(RepSocket {
            poll,
            listener,
            local_addr,
            conns: HashMap::new(),
            next_token: FIRST_CONN,
            pending: VecDeque::new(),
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Wait up to `timeout` for the next request. Malformed messages are
    /// logged and skipped, they never abort the socket.
    pub fn recv(&mut self, timeout: Duration) -> io::Result<Option<(ClientId, Frames)>> {
        if let Some(request) = self.pending.pop_front() {
            return Ok(Some(request));
        }

        let mut events = Events::with_capacity(32);
        match self.poll.poll(&mut events, Some(timeout)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(err) => return Err(err),
        }

        let tokens: Vec<Token> = events.iter().map(|event| event.token()).collect();
        for token in tokens {
            match token {
                LISTENER => self.accept_pending(),
                Token(index) => self.read_conn(index),
            }
        }

        Ok(self.pending.pop_front())
    }

    /// Send a reply to the client a request was received from. A vanished
    /// client is an error but leaves the socket serviceable.
    pub fn reply(&mut self, client: ClientId, frames: &[Vec<u8>]) -> io::Result<()> {
        let wire = encode_message(frames);
        let result = {
            let Some(conn) = self.conns.get_mut(&client.0) else {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "client is gone"));
            };

            let deadline = Instant::now() + REPLY_DEADLINE;
            let mut written = 0;
            loop {
                if written >= wire.len() {
                    break Ok(());
                }
                match conn.stream.write(&wire[written..]) {
                    Ok(0) => break Err(io::Error::from(io::ErrorKind::WriteZero)),
                    Ok(n) => written += n,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        if Instant::now() >= deadline {
                            break Err(io::ErrorKind::TimedOut.into());
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => break Err(err),
                }
            }
        };
        if result.is_err() {
            self.drop_conn(client.0);
        }
        result
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let index = self.next_token;
                    self.next_token += 1;
                    if let Err(err) = self.poll.registry().register(&mut stream, Token(index), Interest::READABLE) {
                        log::warn!("[rep] failed to register client {}: {}", peer, err);
                        continue;
                    }
                    log::debug!("[rep] client connected from {}", peer);
                    self.conns.insert(index, RepConn { stream, codec: FrameCodec::default() });
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    log::warn!("[rep] accept failed: {}", err);
                    break;
                }
            }
        }
    }

    fn read_conn(&mut self, index: usize) {
        let mut drop_conn = false;
        if let Some(conn) = self.conns.get_mut(&index) {
            loop {
                match conn.codec.read_message(&mut conn.stream) {
                    Ok(Some(payload)) => match decode_frames(&payload) {
                        Ok(frames) => self.pending.push_back((ClientId(index), frames)),
                        Err(err) => log::warn!("[rep] dropping malformed request: {}", err),
                    },
                    Ok(None) => break,
                    Err(_) => {
                        drop_conn = true;
                        break;
                    }
                }
            }
        }
        if drop_conn {
            self.drop_conn(index);
        }
    }

    fn drop_conn(&mut self, index: usize) {
        if let Some(mut conn) = self.conns.remove(&index) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            log::debug!("[rep] client disconnected");
        }
    }
}
