// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monitoring listener: a subscriber pool over CMDP.
//!
//! Connects to every discovered MONITORING publisher with the default
//! `LOG/` and `STAT/` prefixes installed. Dashboards and sinks build on
//! top of this by narrowing subscriptions per host or per topic.

use std::io;
use std::sync::Arc;

use crate::chirp::{ChirpManager, DiscoveredService, Md5Hash};
use crate::message::{CmdpMessage, LogLevel};
use crate::pool::SubscriberPool;

/// Default topic prefixes installed on every new connection.
const DEFAULT_PREFIXES: [&[u8]; 2] = [b"LOG/", b"STAT/"];

/// Receives log records and metrics from every discovered peer.
pub struct CmdpListener {
    pool: SubscriberPool<CmdpMessage>,
}

impl CmdpListener {
    /// Start the listener. Messages arrive fully decoded, in publication
    /// order per peer.
    pub fn start(
        callback: impl Fn(CmdpMessage) + Send + 'static,
        chirp: Option<&Arc<ChirpManager>>,
    ) -> io::Result<CmdpListener> {
        let defaults = DEFAULT_PREFIXES.iter().map(|prefix| prefix.to_vec()).collect();
        let mut pool = SubscriberPool::start(callback, defaults)?;
        if let Some(chirp) = chirp {
            pool.attach(chirp);
        }
        Ok(CmdpListener { pool })
    }

    /// Narrow log delivery of one host (or all) to a minimum level by
    /// subscribing its level-specific prefix.
    pub fn subscribe_log_level(&self, host: Option<Md5Hash>, level: LogLevel) {
        let topic = format!("LOG/{}", level);
        self.pool.subscribe(host, topic.as_bytes());
    }

    /// Subscribe an arbitrary topic prefix.
    pub fn subscribe(&self, host: Option<Md5Hash>, topic: &str) {
        self.pool.subscribe(host, topic.as_bytes());
    }

    /// Unsubscribe a topic prefix.
    pub fn unsubscribe(&self, host: Option<Md5Hash>, topic: &str) {
        self.pool.unsubscribe(host, topic.as_bytes());
    }

    /// Connect to a monitoring publisher directly (fixed topologies,
    /// tests).
    pub fn connect(&self, service: DiscoveredService) {
        self.pool.connect(service);
    }

    /// Disconnect from a monitoring publisher.
    pub fn disconnect(&self, service: DiscoveredService) {
        self.pool.disconnect(service);
    }
}
