// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat publisher.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::chirp::{ChirpManager, ServiceIdentifier};
use crate::message::ChpMessage;
use crate::net::PubSocket;
use crate::protocol::State;

/// Callback supplying the current FSM state for outgoing heartbeats.
pub type StateCallback = Arc<dyn Fn() -> State + Send + Sync>;

struct SendShared {
    socket: PubSocket,
    sender_name: String,
    state_callback: StateCallback,
    /// Maximum interval advertised in messages, in milliseconds. Messages
    /// go out at half this interval.
    interval_ms: AtomicU64,
    wakeup: Mutex<()>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

/// Publishes a CHP message at `interval / 2`, advertises the HEARTBEAT
/// service via CHIRP and supports out-of-band extrasystoles.
pub struct HeartbeatSend {
    shared: Arc<SendShared>,
    chirp: Option<Arc<ChirpManager>>,
    port: u16,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatSend {
    pub fn start(
        sender_name: impl Into<String>,
        state_callback: StateCallback,
        interval: Duration,
        chirp: Option<&Arc<ChirpManager>>,
    ) -> io::Result<HeartbeatSend> {
        let socket = PubSocket::bind()?;
        let port = socket.port();

        if let Some(chirp) = chirp {
            chirp.register_service(ServiceIdentifier::Heartbeat, port);
        }

        let shared = Arc::new(SendShared {
            socket,
            sender_name: sender_name.into(),
            state_callback,
            interval_ms: AtomicU64::new(interval.as_millis() as u64),
            wakeup: Mutex::new(()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::spawn(move || sender_loop(&worker));

        Ok(HeartbeatSend { shared, chirp: chirp.cloned(), port, handle: Some(handle) })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of connected heartbeat subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.socket.subscriber_count()
    }

    /// Wake the sender and publish an out-of-band heartbeat promptly.
    pub fn send_extrasystole(&self) {
        self.shared.condvar.notify_one();
    }

    /// Update the maximum heartbeat interval.
    pub fn update_interval(&self, interval: Duration) {
        self.shared.interval_ms.store(interval.as_millis() as u64, Ordering::Relaxed);
        self.shared.condvar.notify_one();
    }
}

impl Drop for HeartbeatSend {
    fn drop(&mut self) {
        if let Some(chirp) = self.chirp.take() {
            chirp.unregister_service(ServiceIdentifier::Heartbeat, self.port);
        }
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn sender_loop(shared: &SendShared) {
    while !shared.shutdown.load(Ordering::Relaxed) {
        let interval = Duration::from_millis(shared.interval_ms.load(Ordering::Relaxed));
        {
            let mut guard = shared.wakeup.lock();
            shared.condvar.wait_for(&mut guard, interval / 2);
        }
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }

        let state = (shared.state_callback)();
        let message = ChpMessage::new(shared.sender_name.clone(), state, interval);
        if let Err(err) = shared.socket.publish(&message.assemble()) {
            log::warn!("[CHP] failed to publish heartbeat: {}", err);
        } else {
            log::trace!("[CHP] published state {} with interval {:?}", state, interval);
        }
    }
}
