// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multi-participant discovery tests over real multicast on loopback.
//!
//! Both participants join the CHIRP group on the loopback interface only,
//! so the tests stay self-contained on a single host.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use constellation::chirp::{ChirpManager, ServiceIdentifier};
use constellation::{Controller, CscpType, Satellite, SatelliteHandler};

fn manager(group: &str, host: &str) -> Arc<ChirpManager> {
    Arc::new(ChirpManager::new(group, host, vec![Ipv4Addr::LOCALHOST]).unwrap())
}

#[test]
fn test_offer_and_depart_propagate() {
    let group = "disc_propagate";
    let provider = manager(group, "provider.one");
    let observer = manager(group, "observer.one");

    let seen: Arc<Mutex<Vec<(u16, bool)>>> = Arc::default();
    let log = Arc::clone(&seen);
    observer.register_discover_callback(
        ServiceIdentifier::Data,
        Arc::new(move |service, depart| {
            log.lock().unwrap().push((service.port, depart));
        }),
    );

    observer.start();
    provider.start();
    provider.register_service(ServiceIdentifier::Data, 46001);

    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "service never discovered");
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(seen.lock().unwrap()[0], (46001, false));

    provider.unregister_service(ServiceIdentifier::Data, 46001);
    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.lock().unwrap().len() < 2 {
        assert!(Instant::now() < deadline, "departure never observed");
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(seen.lock().unwrap()[1], (46001, true));
}

#[test]
fn test_request_triggers_offer() {
    let group = "disc_request";
    let provider = manager(group, "provider.two");
    provider.register_service(ServiceIdentifier::Heartbeat, 46100);
    provider.start();

    // The requester starts later and asks for the service explicitly
    std::thread::sleep(Duration::from_millis(200));
    let requester = manager(group, "requester.two");
    let seen: Arc<Mutex<Vec<u16>>> = Arc::default();
    let log = Arc::clone(&seen);
    requester.register_discover_callback(
        ServiceIdentifier::Heartbeat,
        Arc::new(move |service, depart| {
            if !depart {
                log.lock().unwrap().push(service.port);
            }
        }),
    );
    requester.start();

    let deadline = Instant::now() + Duration::from_secs(10);
    while seen.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "REQUEST never answered with an OFFER");
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(seen.lock().unwrap()[0], 46100);
}

#[test]
fn test_groups_are_isolated() {
    let provider = manager("disc_group_a", "provider.three");
    provider.register_service(ServiceIdentifier::Control, 46200);
    provider.start();

    let outsider = manager("disc_group_b", "outsider.three");
    let seen: Arc<Mutex<Vec<u16>>> = Arc::default();
    let log = Arc::clone(&seen);
    outsider.register_discover_callback(
        ServiceIdentifier::Control,
        Arc::new(move |service, _depart| {
            log.lock().unwrap().push(service.port);
        }),
    );
    outsider.start();

    std::thread::sleep(Duration::from_secs(2));
    assert!(seen.lock().unwrap().is_empty(), "beacon leaked across groups");
}

struct Sputnik;

impl Satellite for Sputnik {
    fn type_name(&self) -> &str {
        "Sputnik"
    }

    fn satellite_name(&self) -> &str {
        "disc"
    }
}

#[test]
fn test_controller_discovers_satellite_end_to_end() {
    let group = "disc_e2e";
    let satellite_chirp = manager(group, "Sputnik.disc");
    let controller_chirp = manager(group, "ctrl.disc");

    let _handler = SatelliteHandler::start(Box::new(Sputnik), Some(&satellite_chirp)).unwrap();
    satellite_chirp.start();

    let mut controller = Controller::new("ctrl.disc");
    controller.attach(&controller_chirp);
    controller_chirp.start();

    let deadline = Instant::now() + Duration::from_secs(10);
    while controller.satellites().is_empty() {
        assert!(Instant::now() < deadline, "controller never discovered the satellite");
        std::thread::sleep(Duration::from_millis(50));
    }

    let host = controller.satellites()[0];
    let reply = controller.send_command(host, "get_name", None, Duration::from_secs(5)).unwrap();
    assert_eq!(reply.verb_type(), CscpType::Success);
    assert_eq!(reply.verb(), "Sputnik.disc");
}
