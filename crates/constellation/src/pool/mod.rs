// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic subscriber pool over one of the pub/sub protocols.
//!
//! The pool owns one subscriber socket per discovered peer, a shared
//! poller and a worker thread. Peers come and go through CHIRP discover
//! callbacks (or direct [`SubscriberPool::connect`] calls in tests);
//! inbound messages are fully decoded before the message callback fires,
//! and decode failures are logged and dropped without ever stopping the
//! worker.

use std::collections::HashMap;
use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::chirp::{CallbackId, ChirpManager, DiscoveredService, Md5Hash, ServiceIdentifier};
use crate::message::{ChpMessage, CmdpMessage, MessageResult};
use crate::net::SubSocket;

const WAKER: Token = Token(0);
const FIRST_CONN: usize = 1;

/// Poll timeout bound, so a shutdown is honoured within this bound even
/// without traffic.
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// A message type carried by one of the pub/sub protocols.
pub trait PoolMessage: Send + 'static {
    /// The CHIRP service announcing endpoints of this protocol.
    const SERVICE: ServiceIdentifier;

    /// Decode a received multi-frame message.
    fn disassemble(frames: &[Vec<u8>]) -> MessageResult<Self>
    where
        Self: Sized;
}

impl PoolMessage for ChpMessage {
    const SERVICE: ServiceIdentifier = ServiceIdentifier::Heartbeat;

    fn disassemble(frames: &[Vec<u8>]) -> MessageResult<Self> {
        ChpMessage::disassemble(frames)
    }
}

impl PoolMessage for CmdpMessage {
    const SERVICE: ServiceIdentifier = ServiceIdentifier::Monitoring;

    fn disassemble(frames: &[Vec<u8>]) -> MessageResult<Self> {
        CmdpMessage::disassemble(frames)
    }
}

enum Command {
    Connect(DiscoveredService),
    Disconnect(DiscoveredService),
    Subscribe { host: Option<Md5Hash>, topic: Vec<u8> },
    Unsubscribe { host: Option<Md5Hash>, topic: Vec<u8> },
}

/// Pool of subscriber sockets for one service type (see module docs).
pub struct SubscriberPool<M: PoolMessage> {
    tx: Sender<Command>,
    waker: Arc<Waker>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    chirp: Option<(Arc<ChirpManager>, CallbackId)>,
    _message: PhantomData<fn(M)>,
}

impl<M: PoolMessage> SubscriberPool<M> {
    /// Start a pool. `default_topics` are subscribed on every socket as
    /// soon as a peer connects.
    pub fn start(
        callback: impl Fn(M) + Send + 'static,
        default_topics: Vec<Vec<u8>>,
    ) -> io::Result<SubscriberPool<M>> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let (tx, rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut worker: PoolWorker<M> = PoolWorker {
            poll,
            conns: HashMap::new(),
            next_token: FIRST_CONN,
            rx,
            callback: Box::new(callback),
            default_topics,
            shutdown: Arc::clone(&shutdown),
            _message: PhantomData,
        };
        let handle = thread::spawn(move || worker.run());

        Ok(SubscriberPool {
            tx,
            waker,
            shutdown,
            handle: Some(handle),
            chirp: None,
            _message: PhantomData,
        })
    }

    /// Wire this pool to a discovery manager: peers offering
    /// `M::SERVICE` connect and disconnect automatically, and a REQUEST
    /// for the service type goes out on the wire.
    pub fn attach(&mut self, chirp: &Arc<ChirpManager>) {
        let tx = self.tx.clone();
        let waker = Arc::clone(&self.waker);
        let id = chirp.register_discover_callback(
            M::SERVICE,
            Arc::new(move |service, depart| {
                let command = if depart {
                    Command::Disconnect(service.clone())
                } else {
                    Command::Connect(service.clone())
                };
                if tx.send(command).is_ok() {
                    let _ = waker.wake();
                }
            }),
        );
        chirp.send_request(M::SERVICE);
        self.chirp = Some((Arc::clone(chirp), id));
    }

    /// Connect to a peer directly (used by tests and fixed topologies).
    pub fn connect(&self, service: DiscoveredService) {
        if self.tx.send(Command::Connect(service)).is_ok() {
            let _ = self.waker.wake();
        }
    }

    /// Disconnect from a peer.
    pub fn disconnect(&self, service: DiscoveredService) {
        if self.tx.send(Command::Disconnect(service)).is_ok() {
            let _ = self.waker.wake();
        }
    }

    /// Subscribe to a topic prefix; without a host this fans out to all
    /// connected sockets. An unknown host is a silent no-op.
    pub fn subscribe(&self, host: Option<Md5Hash>, topic: &[u8]) {
        if self.tx.send(Command::Subscribe { host, topic: topic.to_vec() }).is_ok() {
            let _ = self.waker.wake();
        }
    }

    /// Unsubscribe from a topic prefix; without a host this fans out.
    pub fn unsubscribe(&self, host: Option<Md5Hash>, topic: &[u8]) {
        if self.tx.send(Command::Unsubscribe { host, topic: topic.to_vec() }).is_ok() {
            let _ = self.waker.wake();
        }
    }
}

impl<M: PoolMessage> Drop for SubscriberPool<M> {
    fn drop(&mut self) {
        if let Some((chirp, id)) = self.chirp.take() {
            chirp.unregister_discover_callback(id);
        }
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.waker.wake();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct PoolConn {
    service: DiscoveredService,
    socket: SubSocket,
}

struct PoolWorker<M: PoolMessage> {
    poll: Poll,
    conns: HashMap<usize, PoolConn>,
    next_token: usize,
    rx: Receiver<Command>,
    callback: Box<dyn Fn(M) + Send>,
    default_topics: Vec<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    _message: PhantomData<fn(M)>,
}

impl<M: PoolMessage> PoolWorker<M> {
    fn run(&mut self) {
        let mut events = Events::with_capacity(64);
        while !self.shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                log::error!("[pool] poll failed, stopping worker: {}", err);
                break;
            }

            let tokens: Vec<(Token, bool, bool)> = events
                .iter()
                .map(|event| (event.token(), event.is_readable(), event.is_writable()))
                .collect();
            for (token, readable, writable) in tokens {
                if token == WAKER {
                    continue;
                }
                if writable {
                    self.flush_conn(token.0);
                }
                if readable {
                    self.read_conn(token.0);
                }
            }

            self.drain_commands();
        }
        self.disconnect_all();
    }

    fn drain_commands(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(Command::Connect(service)) => self.connect(service),
                Ok(Command::Disconnect(service)) => self.disconnect(&service),
                Ok(Command::Subscribe { host, topic }) => self.scribe(host, &topic, true),
                Ok(Command::Unsubscribe { host, topic }) => self.scribe(host, &topic, false),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn connect(&mut self, service: DiscoveredService) {
        // Duplicate discover for a connected peer is a no-op
        if self.conns.values().any(|conn| conn.service == service) {
            return;
        }
        let addr = SocketAddr::from((service.address, service.port));
        log::debug!("[pool] connecting to {}...", service.uri());
        let mut socket = match SubSocket::connect(addr) {
            Ok(socket) => socket,
            Err(err) => {
                log::warn!("[pool] failed to connect to {}: {}", service.uri(), err);
                return;
            }
        };

        for topic in &self.default_topics {
            if let Err(err) = socket.subscribe(topic) {
                log::warn!("[pool] failed to subscribe on {}: {}", service.uri(), err);
            }
        }

        let index = self.next_token;
        self.next_token += 1;
        if let Err(err) =
            self.poll.registry().register(socket.source(), Token(index), Interest::READABLE | Interest::WRITABLE)
        {
            log::warn!("[pool] failed to register {}: {}", service.uri(), err);
            return;
        }
        log::info!("[pool] connected to {}", service.uri());
        self.conns.insert(index, PoolConn { service, socket });
    }

    fn disconnect(&mut self, service: &DiscoveredService) {
        let index = self
            .conns
            .iter()
            .find(|(_, conn)| conn.service == *service)
            .map(|(index, _)| *index);
        if let Some(index) = index {
            self.drop_conn(index);
            log::info!("[pool] disconnected from {}", service.uri());
        }
    }

    fn disconnect_all(&mut self) {
        let indices: Vec<usize> = self.conns.keys().copied().collect();
        for index in indices {
            self.drop_conn(index);
        }
    }

    fn scribe(&mut self, host: Option<Md5Hash>, topic: &[u8], subscribe: bool) {
        let mut failed = Vec::new();
        for (index, conn) in &mut self.conns {
            if host.is_some_and(|host| conn.service.host_id != host) {
                continue;
            }
            let result = if subscribe { conn.socket.subscribe(topic) } else { conn.socket.unsubscribe(topic) };
            if let Err(err) = result {
                log::warn!("[pool] failed to adjust subscription on {}: {}", conn.service.uri(), err);
                failed.push(*index);
            }
        }
        for index in failed {
            self.drop_conn(index);
        }
    }

    fn read_conn(&mut self, index: usize) {
        let mut drop_conn = false;
        if let Some(conn) = self.conns.get_mut(&index) {
            loop {
                match conn.socket.recv() {
                    Ok(Some(frames)) => match M::disassemble(&frames) {
                        Ok(message) => (self.callback)(message),
                        Err(err) => {
                            log::warn!("[pool] dropping undecodable message from {}: {}", conn.service.uri(), err);
                        }
                    },
                    Ok(None) => break,
                    Err(err) => {
                        log::debug!("[pool] receive from {} failed: {}", conn.service.uri(), err);
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

    fn flush_conn(&mut self, index: usize) {
        let mut drop_conn = false;
        if let Some(conn) = self.conns.get_mut(&index) {
            if let Err(err) = conn.socket.flush() {
                log::debug!("[pool] flush to {} failed: {}", conn.service.uri(), err);
                drop_conn = true;
            }
        }
        if drop_conn {
            self.drop_conn(index);
        }
    }

    fn drop_conn(&mut self, index: usize) {
        if let Some(mut conn) = self.conns.remove(&index) {
            let _ = self.poll.registry().deregister(conn.socket.source());
        }
    }
}
