// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher side of the pub/sub substrate.
//!
//! A `PubSocket` listens on an ephemeral port and serves any number of
//! subscriber connections. Subscribers send prefix subscriptions upstream;
//! published messages are delivered to every subscriber whose prefix set
//! matches the first frame. Subscription changes are observable, which is
//! what the `LOG?`/`STAT?` notification topics build on.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::net::framing::{decode_frames, encode_message, FrameCodec};
use crate::net::{topic_matches, CONTROL_SUBSCRIBE, CONTROL_UNSUBSCRIBE};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONN: usize = 2;

const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// A subscriber-side subscription change observed by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionEvent {
    pub topic: Vec<u8>,
    pub subscribe: bool,
}

enum Command {
    Publish { first_frame: Vec<u8>, wire: Vec<u8> },
}

/// Publishing socket bound to an ephemeral port.
pub struct PubSocket {
    local_addr: SocketAddr,
    tx: Sender<Command>,
    waker: Arc<Waker>,
    events_rx: Receiver<SubscriptionEvent>,
    subscriber_count: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PubSocket {
    /// Bind on an ephemeral port and start the io thread.
    pub fn bind() -> io::Result<PubSocket> {
        let addr: SocketAddr = "0.0.0.0:0".parse().map_err(|_| io::ErrorKind::InvalidInput)?;
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        let (tx, rx) = unbounded();
        let (events_tx, events_rx) = unbounded();
        let subscriber_count = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut worker = PubWorker {
            poll,
            listener,
            conns: HashMap::new(),
            next_token: FIRST_CONN,
            rx,
            events_tx,
            subscriber_count: Arc::clone(&subscriber_count),
            shutdown: Arc::clone(&shutdown),
        };
        let handle = thread::spawn(move || worker.run());

        Ok(PubSocket {
            local_addr,
            tx,
            waker,
            events_rx,
            subscriber_count,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Publish a multi-frame message to all matching subscribers. Without
    /// subscribers this is a no-op.
    pub fn publish(&self, frames: &[Vec<u8>]) -> io::Result<()> {
        let first_frame = frames.first().cloned().unwrap_or_default();
        let wire = encode_message(frames);
        self.tx
            .send(Command::Publish { first_frame, wire })
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        self.waker.wake()
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Drain one observed subscription change, if any.
    pub fn try_subscription_event(&self) -> Option<SubscriptionEvent> {
        self.events_rx.try_recv().ok()
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.waker.wake();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct PubConn {
    stream: TcpStream,
    codec: FrameCodec,
    subscriptions: Vec<Vec<u8>>,
    outbox: Vec<u8>,
    outbox_pos: usize,
}

impl PubConn {
    fn wants_write(&self) -> bool {
        self.outbox_pos < self.outbox.len()
    }

    fn matches(&self, first_frame: &[u8]) -> bool {
        self.subscriptions.iter().any(|prefix| topic_matches(prefix, first_frame))
    }
}

struct PubWorker {
    poll: Poll,
    listener: TcpListener,
    conns: HashMap<Token, PubConn>,
    next_token: usize,
    rx: Receiver<Command>,
    events_tx: Sender<SubscriptionEvent>,
    subscriber_count: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl PubWorker {
    fn run(&mut self) {
        let mut events = Events::with_capacity(64);
        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("[pub] poll failed, stopping publisher: {}", err);
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_pending(),
                    WAKER => {}
                    token => {
                        if event.is_readable() {
                            self.read_conn(token);
                        }
                        if event.is_writable() {
                            self.flush_conn(token);
                        }
                    }
                }
            }

            self.drain_commands();
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(err) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
                        log::warn!("[pub] failed to register subscriber {}: {}", peer, err);
                        continue;
                    }
                    log::debug!("[pub] subscriber connected from {}", peer);
                    self.conns.insert(
                        token,
                        PubConn {
                            stream,
                            codec: FrameCodec::default(),
                            subscriptions: Vec::new(),
                            outbox: Vec::new(),
                            outbox_pos: 0,
                        },
                    );
                    self.subscriber_count.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    log::warn!("[pub] accept failed: {}", err);
                    break;
                }
            }
        }
    }

    /// Process inbound subscription control messages from one subscriber.
    fn read_conn(&mut self, token: Token) {
        let mut changes = Vec::new();
        let mut drop_conn = false;
        if let Some(conn) = self.conns.get_mut(&token) {
            loop {
                match conn.codec.read_message(&mut conn.stream) {
                    Ok(Some(payload)) => match decode_frames(&payload) {
                        Ok(frames) => {
                            for frame in frames {
                                let Some((&control, topic)) = frame.split_first() else { continue };
                                match control {
                                    CONTROL_SUBSCRIBE => {
                                        if !conn.subscriptions.iter().any(|t| t == topic) {
                                            conn.subscriptions.push(topic.to_vec());
                                            changes.push(SubscriptionEvent { topic: topic.to_vec(), subscribe: true });
                                        }
                                    }
                                    CONTROL_UNSUBSCRIBE => {
                                        let before = conn.subscriptions.len();
                                        conn.subscriptions.retain(|t| t != topic);
                                        if conn.subscriptions.len() != before {
                                            changes.push(SubscriptionEvent { topic: topic.to_vec(), subscribe: false });
                                        }
                                    }
                                    other => {
                                        log::debug!("[pub] ignoring unknown control byte {:#04x}", other);
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            log::debug!("[pub] dropping malformed control message: {}", err);
                        }
                    },
                    Ok(None) => break,
                    Err(_) => {
                        drop_conn = true;
                        break;
                    }
                }
            }
        }
        for change in changes {
            let _ = self.events_tx.send(change);
        }
        if drop_conn {
            self.drop_conn(token);
        }
    }

    fn flush_conn(&mut self, token: Token) {
        let mut drop_conn = false;
        if let Some(conn) = self.conns.get_mut(&token) {
            while conn.wants_write() {
                match conn.stream.write(&conn.outbox[conn.outbox_pos..]) {
                    Ok(0) => {
                        drop_conn = true;
                        break;
                    }
                    Ok(n) => conn.outbox_pos += n,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(_) => {
                        drop_conn = true;
                        break;
                    }
                }
            }
            if !drop_conn {
                if conn.wants_write() {
                    let _ = self.poll.registry().reregister(
                        &mut conn.stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    );
                } else {
                    conn.outbox.clear();
                    conn.outbox_pos = 0;
                    let _ = self.poll.registry().reregister(&mut conn.stream, token, Interest::READABLE);
                }
            }
        }
        if drop_conn {
            self.drop_conn(token);
        }
    }

    fn drain_commands(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(Command::Publish { first_frame, wire }) => {
                    let tokens: Vec<Token> = self
                        .conns
                        .iter()
                        .filter(|(_, conn)| conn.matches(&first_frame))
                        .map(|(token, _)| *token)
                        .collect();
                    for token in tokens {
                        if let Some(conn) = self.conns.get_mut(&token) {
                            conn.outbox.extend_from_slice(&wire);
                        }
                        self.flush_conn(token);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn drop_conn(&mut self, token: Token) {
        if let Some(mut conn) = self.conns.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
            // A vanished subscriber implicitly unsubscribes everything
            for topic in conn.subscriptions {
                let _ = self.events_tx.send(SubscriptionEvent { topic, subscribe: false });
            }
            log::debug!("[pub] subscriber disconnected");
        }
    }
}
