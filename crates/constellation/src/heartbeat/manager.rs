// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Liveness manager fusing remote heartbeats into local interrupts.
//!
//! Keeps one [`Remote`] record per peer, counts lives down while
//! heartbeats stay out and raises the interrupt callback exactly once per
//! failure: either a reported ERROR/SAFE state or silence. The interrupt
//! callback runs with the remote table locked and must not re-enter the
//! manager.
//!
//! Liveness bookkeeping uses the monotonic clock, so wall-clock jumps on
//! the receiver cannot eat or replenish lives; the sender's wall clock is
//! only consulted for the skew diagnostic.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};

use crate::chirp::{ChirpManager, DiscoveredService};
use crate::heartbeat::send::StateCallback;
use crate::heartbeat::{HeartbeatRecv, HeartbeatSend};
use crate::message::ChpMessage;
use crate::protocol::{State, CHP_DEFAULT_INTERVAL, CHP_LIVES};

/// Watchdog wakes at the next expected heartbeat, capped at this bound.
const WATCHDOG_CAP: Duration = Duration::from_secs(3);

/// Tolerated difference between sender and receiver wall clocks before a
/// skew diagnostic is logged.
const CLOCK_SKEW_LIMIT: Duration = Duration::from_secs(3);

/// Callback raised on remote failure conditions.
pub type InterruptCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything the manager knows about one remote heartbeat sender.
#[derive(Debug, Clone)]
struct Remote {
    interval: Duration,
    last_heartbeat: Instant,
    last_checked: Instant,
    last_state: State,
    lives: u8,
}

struct ManagerShared {
    remotes: Mutex<HashMap<String, Remote>>,
    condvar: Condvar,
    interrupt: InterruptCallback,
    shutdown: AtomicBool,
}

impl ManagerShared {
    /// Ingest one received heartbeat (registered as the receiver callback).
    fn process_heartbeat(&self, msg: &ChpMessage) {
        log::trace!(
            "[CHP] {} reports state {}, next message in {:?}",
            msg.sender(),
            msg.state(),
            msg.interval()
        );

        let now = Instant::now();
        let state = msg.state();
        let mut remotes = self.remotes.lock();

        let inserted = !remotes.contains_key(msg.sender());
        let remote = remotes.entry(msg.sender().to_owned()).or_insert_with(|| Remote {
            interval: msg.interval(),
            last_heartbeat: now,
            last_checked: now,
            last_state: state,
            lives: CHP_LIVES,
        });

        match SystemTime::now().duration_since(msg.time()) {
            Ok(deviation) if deviation > CLOCK_SKEW_LIMIT => {
                log::debug!("[CHP] detected time deviation of {:?} to {}", deviation, msg.sender());
            }
            Err(err) if err.duration() > CLOCK_SKEW_LIMIT => {
                log::debug!("[CHP] detected time deviation of -{:?} to {}", err.duration(), msg.sender());
            }
            _ => {}
        }

        // Take immediate action on reported ERROR and SAFE states
        if remote.lives > 0 && matches!(state, State::Error | State::Safe) {
            remote.lives = 0;
            log::debug!("[CHP] detected state {} at {}, interrupting", state, msg.sender());
            (self.interrupt)(&format!("{} reports state {}", msg.sender(), state));
        }

        remote.interval = msg.interval();
        remote.last_heartbeat = now;
        remote.last_state = state;

        // Replenish lives unless the remote is in ERROR or SAFE state
        if !matches!(state, State::Error | State::Safe) {
            remote.lives = CHP_LIVES;
        }

        if inserted {
            // Wake the watchdog so the next deadline includes the new peer
            self.condvar.notify_all();
        }
    }

    /// Watchdog loop: sleep until the next expected heartbeat and take
    /// lives from peers that stayed silent beyond their interval.
    fn watchdog_loop(&self) {
        let mut wakeup = Instant::now() + WATCHDOG_CAP;
        while !self.shutdown.load(Ordering::Relaxed) {
            let mut remotes = self.remotes.lock();
            let timeout = wakeup.saturating_duration_since(Instant::now());
            self.condvar.wait_for(&mut remotes, timeout);
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            let now = Instant::now();
            wakeup = now + WATCHDOG_CAP;
            for (name, remote) in remotes.iter_mut() {
                // Only subtract a life once per interval
                if remote.lives > 0
                    && now.duration_since(remote.last_heartbeat) > remote.interval
                    && now.duration_since(remote.last_checked) > remote.interval
                {
                    remote.lives -= 1;
                    remote.last_checked = now;
                    log::trace!("[CHP] missed heartbeat from {}, reduced lives to {}", name, remote.lives);

                    if remote.lives == 0 {
                        log::debug!("[CHP] missed heartbeats from {}, no lives left", name);
                        (self.interrupt)(&format!("No signs of life detected anymore from {}", name));
                    }
                }

                let next_heartbeat = remote.last_heartbeat + remote.interval;
                if next_heartbeat > now {
                    wakeup = wakeup.min(next_heartbeat);
                }
            }
        }
    }
}

/// Heartbeat manager owning sender, receiver and the watchdog (see module
/// docs).
pub struct HeartbeatManager {
    shared: Arc<ManagerShared>,
    recv: HeartbeatRecv,
    send: HeartbeatSend,
    watchdog: Option<JoinHandle<()>>,
}

impl HeartbeatManager {
    /// Start sender, receiver and watchdog.
    ///
    /// `state_callback` supplies the local state for outgoing heartbeats;
    /// `interrupt` is raised on remote failures and must not call back
    /// into this manager.
    pub fn start(
        sender_name: impl Into<String>,
        state_callback: StateCallback,
        interrupt: InterruptCallback,
        chirp: Option<&Arc<ChirpManager>>,
    ) -> io::Result<HeartbeatManager> {
        let shared = Arc::new(ManagerShared {
            remotes: Mutex::new(HashMap::new()),
            condvar: Condvar::new(),
            interrupt,
            shutdown: AtomicBool::new(false),
        });

        let receiver_shared = Arc::clone(&shared);
        let recv = HeartbeatRecv::start(move |msg| receiver_shared.process_heartbeat(&msg), chirp)?;
        let send = HeartbeatSend::start(sender_name, state_callback, CHP_DEFAULT_INTERVAL, chirp)?;

        let watchdog_shared = Arc::clone(&shared);
        let watchdog = thread::spawn(move || watchdog_shared.watchdog_loop());

        Ok(HeartbeatManager { shared, recv, send, watchdog: Some(watchdog) })
    }

    /// Publish an out-of-band heartbeat promptly.
    pub fn send_extrasystole(&self) {
        self.send.send_extrasystole();
    }

    /// Update the maximum heartbeat interval of the sender.
    pub fn update_interval(&self, interval: Duration) {
        self.send.update_interval(interval);
    }

    /// Port of the own heartbeat publisher.
    pub fn sender_port(&self) -> u16 {
        self.send.port()
    }

    /// Currently registered state of a remote, if known.
    pub fn remote_state(&self, remote: &str) -> Option<State> {
        self.shared.remotes.lock().get(remote).map(|entry| entry.last_state)
    }

    /// Connect the receiver to a heartbeat publisher directly (fixed
    /// topologies, tests).
    pub fn connect(&self, service: DiscoveredService) {
        self.recv.connect(service);
    }

    /// Disconnect the receiver from a heartbeat publisher.
    pub fn disconnect(&self, service: DiscoveredService) {
        self.recv.disconnect(service);
    }

    #[cfg(test)]
    fn inject(&self, msg: &ChpMessage) {
        self.shared.process_heartbeat(msg);
    }
}

impl Drop for HeartbeatManager {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.condvar.notify_all();
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
    }
}
