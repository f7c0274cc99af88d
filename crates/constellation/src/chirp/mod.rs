// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CHIRP peer discovery: multicast beacon protocol and discovery manager.
//!
//! CHIRP announces, requests and retires services on a group-scoped
//! multicast channel. The [`ChirpManager`] owns the beacon socket and the
//! live peer table and dispatches discover/depart callbacks to interested
//! components.

mod hash;
mod manager;
mod message;
mod socket;

pub use hash::Md5Hash;
pub use manager::{CallbackId, ChirpManager, DiscoverCallback};
pub use message::ChirpMessage;
pub use socket::MulticastSocket;

use std::fmt;
use std::net::Ipv4Addr;
use std::time::SystemTime;

/// Protocol identifier at the start of every beacon.
pub const CHIRP_IDENTIFIER: &[u8; 5] = b"CHIRP";

/// Version byte of the CHIRP protocol.
pub const CHIRP_VERSION: u8 = 0x01;

/// Well-known multicast address of the CHIRP protocol.
pub const CHIRP_MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(239, 192, 7, 123);

/// Well-known port of the CHIRP protocol.
pub const CHIRP_PORT: u16 = 7123;

/// Fixed beacon length in bytes.
pub const CHIRP_MESSAGE_LENGTH: usize = 42;

/// Multicast TTL (network hops).
pub const CHIRP_TTL: u32 = 8;

/// Beacon message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChirpMessageType {
    /// Hosts receiving a REQUEST should reply with an OFFER
    Request = 0x01,
    /// A service is available
    Offer = 0x02,
    /// A service is no longer available
    Depart = 0x03,
}

impl ChirpMessageType {
    pub fn from_u8(value: u8) -> Option<ChirpMessageType> {
        match value {
            0x01 => Some(ChirpMessageType::Request),
            0x02 => Some(ChirpMessageType::Offer),
            0x03 => Some(ChirpMessageType::Depart),
            _ => None,
        }
    }
}

/// Service identifier, each bound by convention to one wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ServiceIdentifier {
    /// CSCP control endpoint
    Control = 0x01,
    /// CHP heartbeat publisher
    Heartbeat = 0x02,
    /// CMDP monitoring publisher
    Monitoring = 0x03,
    /// CDTP data sender
    Data = 0x04,
}

impl ServiceIdentifier {
    pub fn from_u8(value: u8) -> Option<ServiceIdentifier> {
        match value {
            0x01 => Some(ServiceIdentifier::Control),
            0x02 => Some(ServiceIdentifier::Heartbeat),
            0x03 => Some(ServiceIdentifier::Monitoring),
            0x04 => Some(ServiceIdentifier::Data),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ServiceIdentifier::Control => "CONTROL",
            ServiceIdentifier::Heartbeat => "HEARTBEAT",
            ServiceIdentifier::Monitoring => "MONITORING",
            ServiceIdentifier::Data => "DATA",
        }
    }
}

impl fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A remote service observed via an OFFER beacon.
///
/// Keyed by (host, service, endpoint); `first_seen` records when the offer
/// was first observed and does not take part in comparisons.
#[derive(Debug, Clone)]
pub struct DiscoveredService {
    pub host_id: Md5Hash,
    pub service: ServiceIdentifier,
    pub address: Ipv4Addr,
    pub port: u16,
    pub first_seen: SystemTime,
}

impl DiscoveredService {
    pub fn new(host_id: Md5Hash, service: ServiceIdentifier, address: Ipv4Addr, port: u16) -> Self {
        Self { host_id, service, address, port, first_seen: SystemTime::now() }
    }

    /// Connection URI of this service.
    pub fn uri(&self) -> String {
        format!("tcp://{}:{}", self.address, self.port)
    }

    fn key(&self) -> (Md5Hash, u8, Ipv4Addr, u16) {
        (self.host_id, self.service as u8, self.address, self.port)
    }
}

impl PartialEq for DiscoveredService {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for DiscoveredService {}

impl PartialOrd for DiscoveredService {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiscoveredService {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl std::hash::Hash for DiscoveredService {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for DiscoveredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} service at {}:{} ({})", self.service, self.address, self.port, self.host_id)
    }
}

/// Error produced while decoding or exchanging beacons.
#[derive(Debug)]
pub enum ChirpError {
    Decode { reason: String },
    Io(std::io::Error),
}

impl fmt::Display for ChirpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChirpError::Decode { reason } => write!(f, "beacon decoding failed: {}", reason),
            ChirpError::Io(err) => write!(f, "beacon socket error: {}", err),
        }
    }
}

impl std::error::Error for ChirpError {}

impl From<std::io::Error> for ChirpError {
    fn from(err: std::io::Error) -> Self {
        ChirpError::Io(err)
    }
}

pub type ChirpResult<T> = core::result::Result<T, ChirpError>;
