// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Constellation - distributed control fabric for measurement satellites
//!
//! A pure Rust implementation of the inter-node fabric shared by every
//! satellite and controller in a constellation: multicast peer discovery
//! (CHIRP), four length-framed binary wire protocols (CSCP, CMDP, CDTP,
//! CHP) on a pub/sub + req/rep substrate, the satellite lifecycle FSM and
//! the heartbeat liveness manager.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use constellation::chirp::{ChirpManager, MulticastSocket};
//! use constellation::satellite::{Satellite, SatelliteHandler};
//!
//! struct Sputnik;
//!
//! impl Satellite for Sputnik {
//!     fn type_name(&self) -> &str {
//!         "Sputnik"
//!     }
//!     fn satellite_name(&self) -> &str {
//!         "one"
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chirp = Arc::new(
//!         ChirpManager::new("edda", "Sputnik.one", MulticastSocket::default_interfaces())?,
//!     );
//!     chirp.start();
//!
//!     let handler = SatelliteHandler::start(Box::new(Sputnik), Some(&chirp))?;
//!     println!("listening on port {}", handler.port());
//!     loop {
//!         std::thread::park();
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Satellite / Controller                      |
//! |     SatelliteHandler -> Fsm -> Satellite trait | Controller        |
//! +--------------------------------------------------------------------+
//! |                           Liveness Layer                           |
//! |     HeartbeatSend | HeartbeatRecv | HeartbeatManager (lives)       |
//! +--------------------------------------------------------------------+
//! |                           Message Layer                            |
//! |     Header | CSCP | CMDP | CDTP | CHP  (MsgPack encoding)          |
//! +--------------------------------------------------------------------+
//! |                          Transport Layer                           |
//! |     CHIRP multicast beacon | Pub/Sub + Req/Rep over TCP            |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`chirp::ChirpManager`] | Peer discovery: beacons, peer table, callbacks |
//! | [`satellite::Satellite`] | User-implemented capability set behind the FSM |
//! | [`satellite::SatelliteHandler`] | CSCP command endpoint |
//! | [`heartbeat::HeartbeatManager`] | Remote liveness scoring and interrupts |
//! | [`controller::Controller`] | Peer issuing commands to satellites |
//! | [`pool::SubscriberPool`] | N-socket subscriber demultiplexer |
//!
//! ## Modules Overview
//!
//! - [`chirp`] - multicast discovery (start here for the network fabric)
//! - [`satellite`] - FSM, command endpoint and registry
//! - [`heartbeat`] - CHP sender/receiver/manager
//! - [`message`] - wire messages of the four protocols
//! - [`protocol`] - identifiers, state encoding, MsgPack codec
//! - [`net`] - the framed TCP substrate
//! - [`pool`] - generic subscriber pool
//! - [`listener`] - CMDP log/metric listener
//! - [`controller`] - controller-side API

/// Peer discovery: CHIRP beacons, multicast socket, discovery manager.
pub mod chirp;
/// Configuration dictionaries and typed access.
pub mod config;
/// Controller-side API.
pub mod controller;
/// Heartbeat sender, receiver and liveness manager.
pub mod heartbeat;
/// CMDP monitoring listener.
pub mod listener;
/// Wire messages of the four framed protocols.
pub mod message;
/// Message-oriented socket substrate (pub/sub, req/rep).
pub mod net;
/// Generic subscriber pool over the pub/sub protocols.
pub mod pool;
/// Protocol identifiers, lifecycle state encoding and MsgPack.
pub mod protocol;
/// Satellite trait, lifecycle FSM, CSCP endpoint and type registry.
pub mod satellite;

pub use chirp::{ChirpManager, DiscoveredService, Md5Hash, ServiceIdentifier};
pub use config::{Configuration, Dictionary, Value};
pub use controller::Controller;
pub use heartbeat::HeartbeatManager;
pub use message::{CdtpMessage, ChpMessage, CmdpMessage, CscpMessage, CscpType, LogLevel};
pub use protocol::{Protocol, State, Transition, TransitionCommand};
pub use satellite::{Fsm, Satellite, SatelliteError, SatelliteHandler, SatelliteRegistry, StopToken};
