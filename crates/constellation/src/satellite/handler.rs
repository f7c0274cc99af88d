// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CSCP command endpoint of a satellite.
//!
//! Binds a reply socket on an ephemeral port, advertises the CONTROL
//! service via CHIRP and serves the receive/validate/dispatch/reply loop.
//! The receive timeout is 100 ms so shutdown stays responsive.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::chirp::{ChirpManager, ServiceIdentifier};
use crate::config::Dictionary;
use crate::message::{CscpMessage, CscpType, Frames};
use crate::net::{ClientId, RepSocket};
use crate::protocol::{GetCommand, TransitionCommand};
use crate::satellite::{Fsm, Satellite};

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Serves CSCP commands for one satellite.
pub struct SatelliteHandler {
    fsm: Arc<Fsm>,
    chirp: Option<Arc<ChirpManager>>,
    port: u16,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SatelliteHandler {
    /// Wrap a satellite in an FSM and start listening for commands.
    pub fn start(satellite: Box<dyn Satellite>, chirp: Option<&Arc<ChirpManager>>) -> io::Result<SatelliteHandler> {
        let fsm = Arc::new(Fsm::new(satellite));
        Self::start_with_fsm(fsm, chirp)
    }

    /// Start the endpoint for an existing FSM (shared with the heartbeat
    /// wiring).
    pub fn start_with_fsm(fsm: Arc<Fsm>, chirp: Option<&Arc<ChirpManager>>) -> io::Result<SatelliteHandler> {
        let rep = RepSocket::bind()?;
        let port = rep.port();

        if let Some(chirp) = chirp {
            chirp.register_service(ServiceIdentifier::Control, port);
        } else {
            log::warn!(
                "[CSCP] no discovery manager attached, satellite {} will not be discovered",
                fsm.canonical_name()
            );
        }
        log::info!("[CSCP] {} listening for commands on port {}", fsm.canonical_name(), port);

        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fsm = Arc::clone(&fsm);
        let worker_shutdown = Arc::clone(&shutdown);
        let handle = thread::spawn(move || command_loop(rep, &worker_fsm, &worker_shutdown));

        Ok(SatelliteHandler {
            fsm,
            chirp: chirp.cloned(),
            port,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Port the reply socket is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The governed FSM, e.g. for heartbeat state callbacks and interrupt
    /// wiring.
    pub fn fsm(&self) -> &Arc<Fsm> {
        &self.fsm
    }
}

impl Drop for SatelliteHandler {
    fn drop(&mut self) {
        if let Some(chirp) = self.chirp.take() {
            chirp.unregister_service(ServiceIdentifier::Control, self.port);
        }
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.fsm.shutdown();
    }
}

fn command_loop(mut rep: RepSocket, fsm: &Arc<Fsm>, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        let (client, frames) = match rep.recv(RECV_TIMEOUT) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                log::error!("[CSCP] receive failed: {}", err);
                log::error!("[CSCP] stopping command loop, no further commands can be received");
                break;
            }
        };

        let reply = handle_request(fsm, &frames);
        if let Err(err) = send_reply(&mut rep, client, fsm, reply) {
            log::warn!("[CSCP] failed to send reply: {}", err);
        }
    }
}

type Reply = (CscpType, String, Option<Vec<u8>>);

fn send_reply(rep: &mut RepSocket, client: ClientId, fsm: &Fsm, reply: Reply) -> io::Result<()> {
    let (verb_type, verb, payload) = reply;
    let mut message = CscpMessage::new(fsm.canonical_name(), verb_type, verb);
    if let Some(payload) = payload {
        message = message.with_payload(payload);
    }
    rep.reply(client, &message.assemble())
}

fn handle_request(fsm: &Arc<Fsm>, frames: &Frames) -> Reply {
    let message = match CscpMessage::disassemble(frames) {
        Ok(message) => message,
        Err(err) => {
            log::warn!("[CSCP] {}", err);
            return (CscpType::Error, err.to_string(), None);
        }
    };

    log::debug!(
        "[CSCP] received {} message with verb \"{}\"{} from {}",
        message.verb_type(),
        message.verb(),
        if message.has_payload() { " and a payload" } else { "" },
        message.header().sender()
    );

    if message.verb_type() != CscpType::Request {
        log::warn!("[CSCP] received message that is not REQUEST type, ignoring");
        return (
            CscpType::Error,
            "Can only handle CSCP messages with REQUEST type".to_owned(),
            None,
        );
    }

    // Verb matching is case-insensitive
    let command = message.verb().to_ascii_lowercase();

    if let Some(transition) = TransitionCommand::from_command(&command) {
        let (verb_type, text) = fsm.react_command(transition, message.payload());
        return (verb_type, text, None);
    }

    if let Some(get) = GetCommand::from_command(&command) {
        return handle_get_command(fsm, get);
    }

    log::warn!("[CSCP] received unknown command \"{}\", ignoring", command);
    (CscpType::Unknown, format!("Command \"{}\" is not known", command), None)
}

fn handle_get_command(fsm: &Arc<Fsm>, command: GetCommand) -> Reply {
    match command {
        GetCommand::GetName => (CscpType::Success, fsm.canonical_name().to_owned(), None),
        GetCommand::GetVersion => (CscpType::Success, env!("CARGO_PKG_VERSION").to_owned(), None),
        GetCommand::GetCommands => {
            let dict: Dictionary = GetCommand::ALL
                .iter()
                .map(|get| (get.name(), get.description()))
                .chain(TransitionCommand::ALL.iter().map(|t| (t.name(), t.description())))
                .collect();
            (
                CscpType::Success,
                format!("{} commands known, list attached", dict.len()),
                Some(dict.to_bytes()),
            )
        }
        GetCommand::GetState => (CscpType::Success, fsm.state().name().to_owned(), None),
        GetCommand::GetStatus => (CscpType::Success, fsm.status(), None),
        GetCommand::GetConfig => {
            let dict = fsm.config().dictionary().clone();
            (
                CscpType::Success,
                format!("{} configuration keys, dictionary attached", dict.len()),
                Some(dict.to_bytes()),
            )
        }
    }
}
