// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end CSCP tests: a satellite endpoint driven over loopback TCP.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use constellation::chirp::{DiscoveredService, Md5Hash, ServiceIdentifier};
use constellation::config::Dictionary;
use constellation::message::Header;
use constellation::net::ReqSocket;
use constellation::protocol::pack::PackWriter;
use constellation::{Controller, CscpMessage, CscpType, Protocol, Satellite, SatelliteHandler};

struct Sputnik;

impl Satellite for Sputnik {
    fn type_name(&self) -> &str {
        "Sputnik"
    }

    fn satellite_name(&self) -> &str {
        "one"
    }
}

fn control_service(port: u16) -> DiscoveredService {
    DiscoveredService::new(Md5Hash::from_name("Sputnik.one"), ServiceIdentifier::Control, Ipv4Addr::LOCALHOST, port)
}

fn start_satellite() -> (SatelliteHandler, Controller, Md5Hash) {
    let handler = SatelliteHandler::start(Box::new(Sputnik), None).unwrap();
    let controller = Controller::new("ctrl.main");
    let service = control_service(handler.port());
    controller.connect(&service);
    (handler, controller, service.host_id)
}

fn command(controller: &Controller, host: Md5Hash, verb: &str) -> CscpMessage {
    controller.send_command(host, verb, None, Duration::from_secs(5)).unwrap()
}

fn wait_for_state(controller: &Controller, host: Md5Hash, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let reply = command(controller, host, "get_state");
        if reply.verb() == expected {
            break;
        }
        assert!(Instant::now() < deadline, "state {} not reached (last: {})", expected, reply.verb());
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_get_state_on_fresh_satellite() {
    let (_handler, controller, host) = start_satellite();
    let reply = command(&controller, host, "get_state");
    assert_eq!(reply.verb_type(), CscpType::Success);
    assert_eq!(reply.verb(), "NEW");
}

#[test]
fn test_get_name_and_version() {
    let (_handler, controller, host) = start_satellite();
    let reply = command(&controller, host, "get_name");
    assert_eq!(reply.verb_type(), CscpType::Success);
    assert_eq!(reply.verb(), "Sputnik.one");

    let reply = command(&controller, host, "get_version");
    assert_eq!(reply.verb_type(), CscpType::Success);
    assert_eq!(reply.verb(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_unknown_command() {
    let (_handler, controller, host) = start_satellite();
    let reply = command(&controller, host, "get_names");
    assert_eq!(reply.verb_type(), CscpType::Unknown);
    assert_eq!(reply.verb(), "Command \"get_names\" is not known");
}

#[test]
fn test_case_insensitive_verbs() {
    let (_handler, controller, host) = start_satellite();
    for verb in ["get_state", "GET_STATE", "Get_State", "gEt_sTaTe"] {
        let reply = command(&controller, host, verb);
        assert_eq!(reply.verb_type(), CscpType::Success);
        assert_eq!(reply.verb(), "NEW");
    }
}

#[test]
fn test_wrong_protocol_is_rejected() {
    let (handler, _controller, _host) = start_satellite();

    // Hand-craft a CMDP-tagged header followed by a CSCP verb frame
    let header = Header::new(Protocol::Cmdp1, "ctrl.main").assemble();
    let mut body = PackWriter::new();
    body.put_u64(0x00);
    body.put_str("get_name");
    let frames = vec![header, body.into_bytes()];

    let mut req = ReqSocket::connect((Ipv4Addr::LOCALHOST, handler.port()).into(), Duration::from_secs(1)).unwrap();
    let reply_frames = req.request(&frames, Duration::from_secs(5)).unwrap();
    let reply = CscpMessage::disassemble(&reply_frames).unwrap();
    assert_eq!(reply.verb_type(), CscpType::Error);
    assert_eq!(
        reply.verb(),
        "Received protocol \"CMDP1\" does not match expected identifier \"CSCP1\""
    );
}

#[test]
fn test_wrong_frame_count_is_rejected() {
    let (handler, _controller, _host) = start_satellite();
    let header = Header::new(Protocol::Cscp1, "ctrl.main").assemble();

    let mut req = ReqSocket::connect((Ipv4Addr::LOCALHOST, handler.port()).into(), Duration::from_secs(1)).unwrap();
    let reply_frames = req.request(&[header], Duration::from_secs(5)).unwrap();
    let reply = CscpMessage::disassemble(&reply_frames).unwrap();
    assert_eq!(reply.verb_type(), CscpType::Error);
    assert_eq!(reply.verb(), "Incorrect number of message frames");
}

#[test]
fn test_non_request_type_is_rejected() {
    let (handler, _controller, _host) = start_satellite();
    let message = CscpMessage::new("ctrl.main", CscpType::Success, "get_name");

    let mut req = ReqSocket::connect((Ipv4Addr::LOCALHOST, handler.port()).into(), Duration::from_secs(1)).unwrap();
    let reply_frames = req.request(&message.assemble(), Duration::from_secs(5)).unwrap();
    let reply = CscpMessage::disassemble(&reply_frames).unwrap();
    assert_eq!(reply.verb_type(), CscpType::Error);
    assert_eq!(reply.verb(), "Can only handle CSCP messages with REQUEST type");
}

#[test]
fn test_initialize_roundtrip() {
    let (_handler, controller, host) = start_satellite();

    let payload = Dictionary::new().to_bytes();
    let reply = controller
        .send_command(host, "initialize", Some(payload), Duration::from_secs(5))
        .unwrap();
    assert_eq!(reply.verb_type(), CscpType::Success);
    assert_eq!(reply.verb(), "Transition initialize is being initiated");

    wait_for_state(&controller, host, "INIT");
}

#[test]
fn test_initialize_without_payload_is_incomplete() {
    let (_handler, controller, host) = start_satellite();
    let reply = command(&controller, host, "initialize");
    assert_eq!(reply.verb_type(), CscpType::Incomplete);
    assert_eq!(reply.verb(), "Transition initialize received incorrect payload");
}

#[test]
fn test_transition_rejected_in_wrong_state() {
    let (_handler, controller, host) = start_satellite();
    let reply = command(&controller, host, "launch");
    assert_eq!(reply.verb_type(), CscpType::Invalid);
    assert_eq!(reply.verb(), "Transition launch not allowed from NEW state");
}

#[test]
fn test_get_commands_lists_everything() {
    let (_handler, controller, host) = start_satellite();
    let reply = command(&controller, host, "get_commands");
    assert_eq!(reply.verb_type(), CscpType::Success);

    let dict = Dictionary::from_bytes(reply.payload().expect("commands payload")).unwrap();
    for verb in [
        "get_name",
        "get_version",
        "get_commands",
        "get_state",
        "get_status",
        "get_config",
        "initialize",
        "launch",
        "land",
        "reconfigure",
        "start",
        "stop",
    ] {
        assert!(dict.contains_key(verb), "{} missing from get_commands", verb);
    }
}

#[test]
fn test_full_lifecycle_via_controller() {
    let (_handler, controller, host) = start_satellite();

    let mut config = Dictionary::new();
    config.insert("threshold", 5i64);
    let reply = controller
        .send_command(host, "initialize", Some(config.to_bytes()), Duration::from_secs(5))
        .unwrap();
    assert_eq!(reply.verb_type(), CscpType::Success);
    wait_for_state(&controller, host, "INIT");

    // The stored configuration is served back
    let reply = command(&controller, host, "get_config");
    assert_eq!(reply.verb_type(), CscpType::Success);
    let stored = Dictionary::from_bytes(reply.payload().expect("config payload")).unwrap();
    assert!(stored.contains_key("threshold"));

    assert_eq!(command(&controller, host, "launch").verb_type(), CscpType::Success);
    wait_for_state(&controller, host, "ORBIT");

    let mut run_number = PackWriter::new();
    run_number.put_u64(17);
    let reply = controller
        .send_command(host, "start", Some(run_number.into_bytes()), Duration::from_secs(5))
        .unwrap();
    assert_eq!(reply.verb_type(), CscpType::Success);
    wait_for_state(&controller, host, "RUN");

    assert_eq!(command(&controller, host, "stop").verb_type(), CscpType::Success);
    wait_for_state(&controller, host, "ORBIT");

    assert_eq!(command(&controller, host, "land").verb_type(), CscpType::Success);
    wait_for_state(&controller, host, "INIT");
}

#[test]
fn test_send_command_all_fans_out() {
    let (_handler_a, controller, host_a) = start_satellite();

    struct Vostok;
    impl Satellite for Vostok {
        fn type_name(&self) -> &str {
            "Vostok"
        }
        fn satellite_name(&self) -> &str {
            "two"
        }
    }
    let handler_b = SatelliteHandler::start(Box::new(Vostok), None).unwrap();
    let service_b = DiscoveredService::new(
        Md5Hash::from_name("Vostok.two"),
        ServiceIdentifier::Control,
        Ipv4Addr::LOCALHOST,
        handler_b.port(),
    );
    controller.connect(&service_b);

    let replies = controller.send_command_all("get_state", None, Duration::from_secs(5));
    assert_eq!(replies.len(), 2);
    for (host, reply) in replies {
        let reply = reply.unwrap();
        assert_eq!(reply.verb(), "NEW");
        assert!(host == host_a || host == service_b.host_id);
    }
}
