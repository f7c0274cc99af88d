// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat receiver: a subscriber pool over the HEARTBEAT service that
//! subscribes to everything each connected peer publishes.

use std::io;
use std::sync::Arc;

use crate::chirp::{ChirpManager, DiscoveredService};
use crate::message::ChpMessage;
use crate::pool::SubscriberPool;

/// Receives CHP messages from every discovered heartbeat publisher.
pub struct HeartbeatRecv {
    pool: SubscriberPool<ChpMessage>,
}

impl HeartbeatRecv {
    /// Start the receiver. Heartbeats are handed to `callback` fully
    /// decoded and in publication order per peer.
    pub fn start(
        callback: impl Fn(ChpMessage) + Send + 'static,
        chirp: Option<&Arc<ChirpManager>>,
    ) -> io::Result<HeartbeatRecv> {
        // The empty prefix subscribes to all messages of a peer
        let mut pool = SubscriberPool::start(callback, vec![Vec::new()])?;
        if let Some(chirp) = chirp {
            pool.attach(chirp);
        }
        Ok(HeartbeatRecv { pool })
    }

    /// Connect to a heartbeat publisher directly (fixed topologies, tests).
    pub fn connect(&self, service: DiscoveredService) {
        self.pool.connect(service);
    }

    /// Disconnect from a heartbeat publisher.
    pub fn disconnect(&self, service: DiscoveredService) {
        self.pool.disconnect(service);
    }
}
