// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request socket for the CSCP request/reply pattern.
//!
//! Blocking by design: controllers issue one request at a time per
//! satellite and await the reply with a caller-supplied timeout.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use crate::message::Frames;
use crate::net::framing::{decode_frames, MESSAGE_HEADER_SIZE};
use crate::net::{encode_message, NetError, NetResult, MAX_MESSAGE_SIZE};

/// Requesting socket connected to one reply endpoint.
#[derive(Debug)]
pub struct ReqSocket {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ReqSocket {
    /// Connect to a reply endpoint within `timeout`.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<ReqSocket> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        Ok(ReqSocket { stream, peer: addr })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send a request and await the matching reply.
    pub fn request(&mut self, frames: &[Vec<u8>], timeout: Duration) -> NetResult<Frames> {
        let deadline = Instant::now() + timeout;
        let wire = encode_message(frames);
        self.stream.set_write_timeout(Some(timeout))?;
        self.stream.write_all(&wire).map_err(map_timeout)?;

        let mut header = [0u8; MESSAGE_HEADER_SIZE];
        self.read_exact_deadline(&mut header, deadline)?;
        let length = u32::from_be_bytes(header) as usize;
        if length == 0 {
            return Err(NetError::MalformedMessage { reason: "zero-length reply".into() });
        }
        if length > MAX_MESSAGE_SIZE {
            return Err(NetError::MessageTooLarge { size: length });
        }

        let mut payload = vec![0u8; length];
        self.read_exact_deadline(&mut payload, deadline)?;
        decode_frames(&payload)
    }

    fn read_exact_deadline(&mut self, buf: &mut [u8], deadline: Instant) -> NetResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NetError::Timeout);
            }
            self.stream.set_read_timeout(Some(remaining))?;
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(NetError::Disconnected),
                Ok(n) => filled += n,
                Err(err)
                    if err.kind() == io::ErrorKind::WouldBlock || err.kind() == io::ErrorKind::TimedOut =>
                {
                    return Err(NetError::Timeout);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(NetError::Io(err)),
            }
        }
        Ok(())
    }
}

fn map_timeout(err: io::Error) -> NetError {
    if err.kind() == io::ErrorKind::WouldBlock || err.kind() == io::ErrorKind::TimedOut {
        NetError::Timeout
    } else {
        NetError::from(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::RepSocket;
    use std::net::Ipv4Addr;

    #[test]
    fn test_request_reply_roundtrip() {
        let mut rep = RepSocket::bind().unwrap();
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, rep.port()));

        let server = std::thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                if let Some((client, frames)) = rep.recv(Duration::from_millis(100)).unwrap() {
                    assert_eq!(frames, vec![b"ping".to_vec(), b"x".to_vec()]);
                    rep.reply(client, &[b"pong".to_vec()]).unwrap();
                    break;
                }
                assert!(Instant::now() < deadline, "no request received");
            }
        });

        let mut req = ReqSocket::connect(addr, Duration::from_secs(1)).unwrap();
        let reply = req
            .request(&[b"ping".to_vec(), b"x".to_vec()], Duration::from_secs(5))
            .unwrap();
        assert_eq!(reply, vec![b"pong".to_vec()]);
        server.join().unwrap();
    }

    #[test]
    fn test_request_times_out_without_reply() {
        let mut rep = RepSocket::bind().unwrap();
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, rep.port()));

        let mut req = ReqSocket::connect(addr, Duration::from_secs(1)).unwrap();
        // Service the accept so the request lands, then never reply.
        let _ = rep.recv(Duration::from_millis(100)).unwrap();

        let started = Instant::now();
        let result = req.request(&[b"ping".to_vec()], Duration::from_millis(200));
        assert!(matches!(result, Err(NetError::Timeout)));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_sequential_requests_on_one_connection() {
        let mut rep = RepSocket::bind().unwrap();
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, rep.port()));

        let server = std::thread::spawn(move || {
            let mut served = 0;
            let deadline = Instant::now() + Duration::from_secs(5);
            while served < 3 {
                if let Some((client, frames)) = rep.recv(Duration::from_millis(100)).unwrap() {
                    rep.reply(client, &frames).unwrap();
                    served += 1;
                }
                assert!(Instant::now() < deadline, "requests missing");
            }
        });

        let mut req = ReqSocket::connect(addr, Duration::from_secs(1)).unwrap();
        for n in 0..3u8 {
            let reply = req.request(&[vec![n]], Duration::from_secs(5)).unwrap();
            assert_eq!(reply, vec![vec![n]]);
        }
        server.join().unwrap();
    }
}
