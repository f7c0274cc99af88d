// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast socket for CHIRP beacons.
//!
//! Joins the group-scoped multicast group on every selected interface and
//! sends outgoing beacons once per interface. Loopback copies are disabled;
//! the loopback interface is joined explicitly instead.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol as SockProtocol, SockAddr, SockRef, Socket, Type};

use crate::chirp::{CHIRP_MULTICAST_ADDRESS, CHIRP_PORT, CHIRP_TTL};

const RECV_BUFFER: usize = 1024;

/// UDP multicast socket bound to the CHIRP group and port.
#[derive(Debug)]
pub struct MulticastSocket {
    socket: UdpSocket,
    interfaces: Vec<Ipv4Addr>,
}

impl MulticastSocket {
    /// Open the socket and join the multicast group on each interface.
    pub fn new(interfaces: Vec<Ipv4Addr>) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;

        // Ensure the well-known port can be bound by other participants on
        // the same host
        socket.set_reuse_address(true)?;
        socket.set_multicast_ttl_v4(CHIRP_TTL)?;
        socket.set_multicast_loop_v4(false)?;
        socket.bind(&SockAddr::from(SocketAddr::from((Ipv4Addr::UNSPECIFIED, CHIRP_PORT))))?;

        for interface in &interfaces {
            match socket.join_multicast_v4(&CHIRP_MULTICAST_ADDRESS, interface) {
                Ok(()) => {
                    log::debug!("[CHIRP] joined {} on interface {}", CHIRP_MULTICAST_ADDRESS, interface);
                }
                Err(err) => {
                    // Non-fatal: skip interfaces that cannot join multicast
                    log::debug!(
                        "[CHIRP] join of {} on {} failed (non-fatal): {}",
                        CHIRP_MULTICAST_ADDRESS,
                        interface,
                        err
                    );
                }
            }
        }

        Ok(Self { socket: socket.into(), interfaces })
    }

    /// All non-loopback IPv4 interfaces plus loopback.
    ///
    /// Loopback is included so that participants on the same host discover
    /// each other without relying on multicast loopback copies.
    pub fn default_interfaces() -> Vec<Ipv4Addr> {
        let mut interfaces = vec![Ipv4Addr::LOCALHOST];
        match local_ip_address::list_afinet_netifas() {
            Ok(netifas) => {
                for (_name, ip) in netifas {
                    if let IpAddr::V4(ipv4) = ip {
                        if !ipv4.is_loopback() && !interfaces.contains(&ipv4) {
                            interfaces.push(ipv4);
                        }
                    }
                }
            }
            Err(err) => {
                log::debug!("[CHIRP] failed to list network interfaces: {}", err);
            }
        }
        interfaces
    }

    pub fn interfaces(&self) -> &[Ipv4Addr] {
        &self.interfaces
    }

    /// Send a beacon on every interface. Fire-and-forget: no retries, no
    /// acknowledgement.
    pub fn send(&self, message: &[u8]) -> io::Result<()> {
        let target = SocketAddr::from((CHIRP_MULTICAST_ADDRESS, CHIRP_PORT));
        let sock_ref = SockRef::from(&self.socket);
        for interface in &self.interfaces {
            sock_ref.set_multicast_if_v4(interface)?;
            self.socket.send_to(message, target)?;
        }
        Ok(())
    }

    /// Receive one datagram within `timeout`. Returns the raw bytes and the
    /// sender address, or `None` on timeout.
    pub fn recv(&self, timeout: Duration) -> io::Result<Option<(Vec<u8>, Ipv4Addr)>> {
        // A zero timeout would put the socket into blocking mode
        self.socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let mut buffer = [0u8; RECV_BUFFER];
        match self.socket.recv_from(&mut buffer) {
            Ok((length, addr)) => {
                let sender = match addr.ip() {
                    IpAddr::V4(ipv4) => ipv4,
                    IpAddr::V6(_) => return Ok(None),
                };
                Ok(Some((buffer[..length].to_vec(), sender)))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock || err.kind() == io::ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chirp::{ChirpMessage, ChirpMessageType, ServiceIdentifier};

    #[test]
    fn test_loopback_send_recv() {
        let sender = MulticastSocket::new(vec![Ipv4Addr::LOCALHOST]).unwrap();
        let receiver = MulticastSocket::new(vec![Ipv4Addr::LOCALHOST]).unwrap();

        let msg =
            ChirpMessage::from_names(ChirpMessageType::Offer, "edda", "sat.lab", ServiceIdentifier::Control, 41000);
        sender.send(&msg.assemble()).unwrap();

        // The sender's own socket may also pick the beacon up; poll the
        // receiver until the expected message arrives.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            match receiver.recv(Duration::from_millis(200)).unwrap() {
                Some((bytes, _addr)) => {
                    let decoded = ChirpMessage::disassemble(&bytes).unwrap();
                    assert_eq!(decoded, msg);
                    break;
                }
                None => {
                    assert!(std::time::Instant::now() < deadline, "no beacon received within deadline");
                }
            }
        }
    }

    #[test]
    fn test_recv_timeout_returns_none() {
        let socket = MulticastSocket::new(vec![Ipv4Addr::LOCALHOST]).unwrap();
        // Other tests may beacon concurrently on the shared port; drain
        // until the channel is quiet and the timeout path is taken.
        let mut drained = 0;
        loop {
            let started = std::time::Instant::now();
            match socket.recv(Duration::from_millis(50)).unwrap() {
                None => {
                    assert!(started.elapsed() >= Duration::from_millis(40));
                    break;
                }
                Some(_) => {
                    drained += 1;
                    assert!(drained < 100, "beacon channel never went quiet");
                }
            }
        }
    }
}
