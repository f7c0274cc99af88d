// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery manager: owns the beacon socket and the live peer table.
//!
//! A background thread receives beacons, answers REQUESTs for registered
//! services, re-announces OFFERs periodically and keeps the peer table
//! consistent. Observers register discover callbacks per service type;
//! callbacks are invoked with the table lock released and are strictly
//! serialized, so a discover can never overlap the matching depart.
//!
//! Registered callbacks must not re-enter the manager.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::chirp::{
    ChirpMessage, ChirpMessageType, ChirpResult, DiscoveredService, Md5Hash, MulticastSocket,
    ServiceIdentifier,
};

/// Re-announce all registered services at least this often.
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a single blocking receive, so shutdown is honoured
/// within this bound even without traffic.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Discover/depart observer. Invoked as `callback(service, departed)`.
pub type DiscoverCallback = Arc<dyn Fn(&DiscoveredService, bool) + Send + Sync>;

/// Handle returned by [`ChirpManager::register_discover_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackId(u64);

#[derive(Default)]
struct Registry {
    /// Services this participant offers: (service, port)
    services: BTreeSet<(ServiceIdentifier, u16)>,
    /// host_id -> services offered by that host
    hosts: BTreeMap<Md5Hash, BTreeSet<DiscoveredService>>,
    /// service -> hosts offering it (auxiliary fan-out index)
    providers: BTreeMap<ServiceIdentifier, BTreeSet<Md5Hash>>,
    /// Discover callbacks keyed by handle
    callbacks: BTreeMap<u64, (ServiceIdentifier, DiscoverCallback)>,
    next_callback: u64,
}

impl Registry {
    /// Insert a discovered service, keeping both indices in step.
    fn insert(&mut self, service: DiscoveredService) {
        self.providers.entry(service.service).or_default().insert(service.host_id);
        self.hosts.entry(service.host_id).or_default().insert(service);
    }

    /// Remove a discovered service, keeping both indices in step.
    fn remove(&mut self, service: &DiscoveredService) -> bool {
        let Some(entries) = self.hosts.get_mut(&service.host_id) else {
            return false;
        };
        let removed = entries.remove(service);
        if removed {
            let hosts_service_left = entries.iter().any(|s| s.service == service.service);
            if entries.is_empty() {
                self.hosts.remove(&service.host_id);
            }
            if !hosts_service_left {
                if let Some(providers) = self.providers.get_mut(&service.service) {
                    providers.remove(&service.host_id);
                    if providers.is_empty() {
                        self.providers.remove(&service.service);
                    }
                }
            }
        }
        removed
    }

    fn callbacks_for(&self, service: ServiceIdentifier) -> Vec<DiscoverCallback> {
        self.callbacks
            .values()
            .filter(|(interest, _)| *interest == service)
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

/// Peer discovery manager (see module docs).
pub struct ChirpManager {
    group_name: String,
    host_name: String,
    group_id: Md5Hash,
    host_id: Md5Hash,
    socket: Arc<MulticastSocket>,
    registry: Arc<Mutex<Registry>>,
    /// Serializes all callback invocations across threads
    dispatch_lock: Arc<Mutex<()>>,
    shutdown: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ChirpManager {
    /// Create a manager for `group`/`host` with the beacon socket joined on
    /// the given interfaces. The listener thread is started separately via
    /// [`ChirpManager::start`].
    pub fn new(group: &str, host: &str, interfaces: Vec<Ipv4Addr>) -> ChirpResult<Self> {
        let socket = MulticastSocket::new(interfaces)?;
        Ok(Self {
            group_name: group.to_owned(),
            host_name: host.to_owned(),
            group_id: Md5Hash::from_name(group),
            host_id: Md5Hash::from_name(host),
            socket: Arc::new(socket),
            registry: Arc::new(Mutex::new(Registry::default())),
            dispatch_lock: Arc::new(Mutex::new(())),
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn host_id(&self) -> Md5Hash {
        self.host_id
    }

    /// Start the listener thread: request services of interest, announce
    /// own services and then serve the beacon channel until shutdown.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        *handle = Some(thread::spawn(move || manager.listener_loop()));
    }

    /// Register an own service. Announced immediately and periodically
    /// until unregistered.
    pub fn register_service(&self, service: ServiceIdentifier, port: u16) {
        self.registry.lock().services.insert((service, port));
        self.send_beacon(ChirpMessageType::Offer, service, port);
        log::info!("[CHIRP] registered {} service on port {}", service, port);
    }

    /// Unregister an own service and send a DEPART for it.
    pub fn unregister_service(&self, service: ServiceIdentifier, port: u16) {
        let removed = self.registry.lock().services.remove(&(service, port));
        if removed {
            self.send_beacon(ChirpMessageType::Depart, service, port);
            log::info!("[CHIRP] unregistered {} service on port {}", service, port);
        }
    }

    /// Register a discover callback for one service type.
    ///
    /// Already-known providers of that service are delivered synthetically
    /// before this returns, so observers never miss peers discovered
    /// earlier.
    pub fn register_discover_callback(
        &self,
        service: ServiceIdentifier,
        callback: DiscoverCallback,
    ) -> CallbackId {
        let (id, known) = {
            let mut registry = self.registry.lock();
            let id = registry.next_callback;
            registry.next_callback += 1;
            registry.callbacks.insert(id, (service, Arc::clone(&callback)));
            let known: Vec<DiscoveredService> = registry
                .hosts
                .values()
                .flatten()
                .filter(|entry| entry.service == service)
                .cloned()
                .collect();
            (id, known)
        };

        let _serialize = self.dispatch_lock.lock();
        for entry in &known {
            callback(entry, false);
        }
        CallbackId(id)
    }

    /// Remove a discover callback. Unknown handles are a no-op.
    pub fn unregister_discover_callback(&self, id: CallbackId) {
        self.registry.lock().callbacks.remove(&id.0);
    }

    /// Emit a one-off REQUEST for a service type.
    pub fn send_request(&self, service: ServiceIdentifier) {
        self.send_beacon(ChirpMessageType::Request, service, 0);
    }

    /// Purge the peer table (or a single host) and fire departure callbacks
    /// for every removed entry.
    pub fn forget_discovered_services(&self, host: Option<Md5Hash>) {
        let removed: Vec<DiscoveredService> = {
            let mut registry = self.registry.lock();
            let keys: Vec<Md5Hash> = match host {
                Some(host) => registry.hosts.contains_key(&host).then_some(host).into_iter().collect(),
                None => registry.hosts.keys().copied().collect(),
            };
            let mut removed = Vec::new();
            for key in keys {
                if let Some(entries) = registry.hosts.remove(&key) {
                    removed.extend(entries);
                }
            }
            for entry in &removed {
                if let Some(providers) = registry.providers.get_mut(&entry.service) {
                    providers.remove(&entry.host_id);
                    if providers.is_empty() {
                        registry.providers.remove(&entry.service);
                    }
                }
            }
            removed
        };

        for entry in removed {
            self.dispatch(&entry, true);
        }
    }

    /// Snapshot of currently discovered providers of a service.
    pub fn discovered_services(&self, service: ServiceIdentifier) -> Vec<DiscoveredService> {
        self.registry
            .lock()
            .hosts
            .values()
            .flatten()
            .filter(|entry| entry.service == service)
            .cloned()
            .collect()
    }

    fn send_beacon(&self, msg_type: ChirpMessageType, service: ServiceIdentifier, port: u16) {
        let beacon = ChirpMessage::new(msg_type, self.group_id, self.host_id, service, port);
        if let Err(err) = self.socket.send(&beacon.assemble()) {
            log::warn!("[CHIRP] failed to send {:?} beacon: {}", msg_type, err);
        }
    }

    /// Announce all currently registered services.
    fn announce_services(&self) {
        let services: Vec<(ServiceIdentifier, u16)> = self.registry.lock().services.iter().copied().collect();
        for (service, port) in services {
            self.send_beacon(ChirpMessageType::Offer, service, port);
        }
    }

    fn listener_loop(self: Arc<Self>) {
        // Ask the constellation about services we are interested in, then
        // introduce ourselves.
        let interests: BTreeSet<ServiceIdentifier> = {
            let registry = self.registry.lock();
            registry.callbacks.values().map(|(service, _)| *service).collect()
        };
        for service in interests {
            self.send_request(service);
        }
        self.announce_services();

        let mut next_announce = Instant::now() + ANNOUNCE_INTERVAL;
        while !self.shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= next_announce {
                self.announce_services();
                next_announce = now + ANNOUNCE_INTERVAL;
            }

            let timeout = next_announce.saturating_duration_since(now).min(RECV_TIMEOUT);
            match self.socket.recv(timeout) {
                Ok(Some((bytes, sender))) => match ChirpMessage::disassemble(&bytes) {
                    Ok(beacon) => self.process_beacon(&beacon, sender),
                    Err(err) => log::debug!("[CHIRP] dropping malformed beacon from {}: {}", sender, err),
                },
                Ok(None) => {}
                Err(err) => {
                    log::error!("[CHIRP] beacon socket failed, stopping discovery: {}", err);
                    break;
                }
            }
        }
        log::debug!("[CHIRP] listener stopped");
    }

    /// Handle a single received beacon. Split out for tests.
    pub(crate) fn process_beacon(&self, beacon: &ChirpMessage, sender: Ipv4Addr) {
        // Ignore our own beacons and foreign constellations
        if beacon.host_id() == self.host_id || beacon.group_id() != self.group_id {
            return;
        }

        match beacon.msg_type() {
            ChirpMessageType::Request => {
                let offers: Vec<(ServiceIdentifier, u16)> = self
                    .registry
                    .lock()
                    .services
                    .iter()
                    .filter(|(service, _)| *service == beacon.service())
                    .copied()
                    .collect();
                for (service, port) in offers {
                    self.send_beacon(ChirpMessageType::Offer, service, port);
                }
            }
            ChirpMessageType::Offer => {
                let discovered =
                    DiscoveredService::new(beacon.host_id(), beacon.service(), sender, beacon.port());
                self.process_offer(discovered);
            }
            ChirpMessageType::Depart => {
                let departed =
                    DiscoveredService::new(beacon.host_id(), beacon.service(), sender, beacon.port());
                let removed = self.registry.lock().remove(&departed);
                if removed {
                    log::info!("[CHIRP] {} departed", departed);
                    self.dispatch(&departed, true);
                }
            }
        }
    }

    fn process_offer(&self, discovered: DiscoveredService) {
        let replaced: Option<DiscoveredService> = {
            let mut registry = self.registry.lock();
            let existing = registry
                .hosts
                .get(&discovered.host_id)
                .and_then(|entries| entries.iter().find(|e| e.service == discovered.service).cloned());

            match existing {
                // Unchanged endpoint: idempotent, no callback
                Some(ref entry) if entry.address == discovered.address && entry.port == discovered.port => {
                    return;
                }
                // Changed endpoint: replace, then depart + discover
                Some(entry) => {
                    registry.remove(&entry);
                    registry.insert(discovered.clone());
                    Some(entry)
                }
                None => {
                    registry.insert(discovered.clone());
                    None
                }
            }
        };

        if let Some(old) = replaced {
            log::info!("[CHIRP] {} moved to {}:{}", old, discovered.address, discovered.port);
            self.dispatch(&old, true);
        } else {
            log::info!("[CHIRP] discovered {}", discovered);
        }
        self.dispatch(&discovered, false);
    }

    /// Invoke matching callbacks with the table lock released. All
    /// invocations are serialized through one dispatch lock, which keeps
    /// discover/depart for a given key strictly ordered.
    fn dispatch(&self, service: &DiscoveredService, depart: bool) {
        let callbacks = self.registry.lock().callbacks_for(service.service);
        if callbacks.is_empty() {
            return;
        }
        let _serialize = self.dispatch_lock.lock();
        for callback in callbacks {
            callback(service, depart);
        }
    }

    /// Stop the listener and send DEPART for every registered service.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        let services: Vec<(ServiceIdentifier, u16)> = self.registry.lock().services.iter().copied().collect();
        for (service, port) in services {
            self.send_beacon(ChirpMessageType::Depart, service, port);
        }
    }
}

impl Drop for ChirpManager {
    fn drop(&mut self) {
        self.stop();
    }
}
