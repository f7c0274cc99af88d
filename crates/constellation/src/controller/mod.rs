// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Controller side of the fabric.
//!
//! Discovers CONTROL services, keeps one request socket per known
//! satellite and sends CSCP requests with a caller-supplied timeout. Each
//! socket is treated independently; cluster-wide sequences are composed by
//! the caller, there are no transactional semantics across satellites.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::chirp::{CallbackId, ChirpManager, DiscoveredService, Md5Hash, ServiceIdentifier};
use crate::message::{CscpMessage, MessageError};
use crate::net::{NetError, ReqSocket};

/// Timeout for establishing a connection to a discovered satellite.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Controller error.
#[derive(Debug)]
pub enum ControllerError {
    /// No connection to the addressed satellite.
    UnknownSatellite,
    Net(NetError),
    Message(MessageError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::UnknownSatellite => f.write_str("satellite is not connected"),
            ControllerError::Net(err) => write!(f, "{}", err),
            ControllerError::Message(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<NetError> for ControllerError {
    fn from(err: NetError) -> Self {
        ControllerError::Net(err)
    }
}

impl From<MessageError> for ControllerError {
    fn from(err: MessageError) -> Self {
        ControllerError::Message(err)
    }
}

struct Connection {
    socket: ReqSocket,
    uri: String,
}

/// Peer-side counterpart of the satellites (see module docs).
pub struct Controller {
    name: String,
    connections: Arc<DashMap<Md5Hash, Connection>>,
    chirp: Option<(Arc<ChirpManager>, CallbackId)>,
}

impl Controller {
    /// Create a controller with the given canonical name.
    pub fn new(name: impl Into<String>) -> Controller {
        Controller {
            name: name.into(),
            connections: Arc::new(DashMap::new()),
            chirp: None,
        }
    }

    /// Wire the controller to a discovery manager: CONTROL services
    /// connect and disconnect automatically.
    pub fn attach(&mut self, chirp: &Arc<ChirpManager>) {
        let connections = Arc::clone(&self.connections);
        let id = chirp.register_discover_callback(
            ServiceIdentifier::Control,
            Arc::new(move |service, depart| {
                if depart {
                    if connections.remove(&service.host_id).is_some() {
                        log::info!("[controller] satellite at {} departed", service.uri());
                    }
                } else {
                    register_satellite(&connections, service);
                }
            }),
        );
        chirp.send_request(ServiceIdentifier::Control);
        self.chirp = Some((Arc::clone(chirp), id));
    }

    /// Connect to a CONTROL endpoint directly (fixed topologies, tests).
    pub fn connect(&self, service: &DiscoveredService) {
        register_satellite(&self.connections, service);
    }

    /// Drop the connection to one satellite.
    pub fn disconnect(&self, host: Md5Hash) {
        self.connections.remove(&host);
    }

    /// Host ids of all connected satellites.
    pub fn satellites(&self) -> Vec<Md5Hash> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_connected(&self, host: Md5Hash) -> bool {
        self.connections.contains_key(&host)
    }

    /// Send a CSCP REQUEST to one satellite and await the reply.
    pub fn send_command(
        &self,
        host: Md5Hash,
        command: &str,
        payload: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<CscpMessage, ControllerError> {
        let mut request = CscpMessage::request(self.name.clone(), command);
        if let Some(payload) = payload {
            request = request.with_payload(payload);
        }
        let frames = request.assemble();

        let mut entry = self.connections.get_mut(&host).ok_or(ControllerError::UnknownSatellite)?;
        let reply = match entry.socket.request(&frames, timeout) {
            Ok(reply) => reply,
            Err(err) => {
                // A dead connection is dropped; rediscovery re-adds it
                let uri = entry.uri.clone();
                drop(entry);
                self.connections.remove(&host);
                log::warn!("[controller] request to {} failed: {}", uri, err);
                return Err(err.into());
            }
        };
        drop(entry);

        Ok(CscpMessage::disassemble(&reply)?)
    }

    /// Send the same command to every connected satellite, one socket at a
    /// time, and collect the per-satellite outcomes.
    pub fn send_command_all(
        &self,
        command: &str,
        payload: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Vec<(Md5Hash, Result<CscpMessage, ControllerError>)> {
        self.satellites()
            .into_iter()
            .map(|host| {
                let reply = self.send_command(host, command, payload.clone(), timeout);
                (host, reply)
            })
            .collect()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some((chirp, id)) = self.chirp.take() {
            chirp.unregister_discover_callback(id);
        }
    }
}

fn register_satellite(connections: &DashMap<Md5Hash, Connection>, service: &DiscoveredService) {
    if connections.contains_key(&service.host_id) {
        log::debug!("[controller] satellite at {} already registered", service.uri());
        return;
    }
    let addr = SocketAddr::from((service.address, service.port));
    match ReqSocket::connect(addr, CONNECT_TIMEOUT) {
        Ok(socket) => {
            log::info!("[controller] registered satellite at {}", service.uri());
            connections.insert(service.host_id, Connection { socket, uri: service.uri() });
        }
        Err(err) => {
            log::warn!("[controller] failed to connect to {}: {}", service.uri(), err);
        }
    }
}
