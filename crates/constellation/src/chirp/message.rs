// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The fixed 42-byte CHIRP beacon.
//!
//! Layout: 5-byte identifier `CHIRP` + 1-byte version + 1-byte message type
//! + 16-byte group hash + 16-byte host hash + 1-byte service identifier +
//! 2-byte port (little endian).

use crate::chirp::{
    ChirpError, ChirpMessageType, ChirpResult, Md5Hash, ServiceIdentifier, CHIRP_IDENTIFIER,
    CHIRP_MESSAGE_LENGTH, CHIRP_VERSION,
};

/// A single beacon on the CHIRP multicast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChirpMessage {
    msg_type: ChirpMessageType,
    group_id: Md5Hash,
    host_id: Md5Hash,
    service: ServiceIdentifier,
    port: u16,
}

impl ChirpMessage {
    pub fn new(
        msg_type: ChirpMessageType,
        group_id: Md5Hash,
        host_id: Md5Hash,
        service: ServiceIdentifier,
        port: u16,
    ) -> Self {
        Self { msg_type, group_id, host_id, service, port }
    }

    /// Build a beacon from group and host names.
    pub fn from_names(
        msg_type: ChirpMessageType,
        group: &str,
        host: &str,
        service: ServiceIdentifier,
        port: u16,
    ) -> Self {
        Self::new(msg_type, Md5Hash::from_name(group), Md5Hash::from_name(host), service, port)
    }

    pub fn msg_type(&self) -> ChirpMessageType {
        self.msg_type
    }

    pub fn group_id(&self) -> Md5Hash {
        self.group_id
    }

    pub fn host_id(&self) -> Md5Hash {
        self.host_id
    }

    pub fn service(&self) -> ServiceIdentifier {
        self.service
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Encode into the fixed wire layout.
    pub fn assemble(&self) -> [u8; CHIRP_MESSAGE_LENGTH] {
        let mut out = [0u8; CHIRP_MESSAGE_LENGTH];
        out[0..5].copy_from_slice(CHIRP_IDENTIFIER);
        out[5] = CHIRP_VERSION;
        out[6] = self.msg_type as u8;
        out[7..23].copy_from_slice(self.group_id.as_bytes());
        out[23..39].copy_from_slice(self.host_id.as_bytes());
        out[39] = self.service as u8;
        out[40] = (self.port & 0x00ff) as u8;
        out[41] = (self.port >> 8) as u8;
        out
    }

    /// Decode a received datagram, validating length, identifier and ranges.
    pub fn disassemble(data: &[u8]) -> ChirpResult<ChirpMessage> {
        if data.len() != CHIRP_MESSAGE_LENGTH {
            return Err(ChirpError::Decode {
                reason: format!("message length is not {} bytes", CHIRP_MESSAGE_LENGTH),
            });
        }
        if &data[0..5] != CHIRP_IDENTIFIER || data[5] != CHIRP_VERSION {
            return Err(ChirpError::Decode { reason: "not a CHIRP v1 beacon".into() });
        }
        let msg_type = ChirpMessageType::from_u8(data[6])
            .ok_or_else(|| ChirpError::Decode { reason: format!("message type {} invalid", data[6]) })?;

        let mut group = [0u8; 16];
        group.copy_from_slice(&data[7..23]);
        let mut host = [0u8; 16];
        host.copy_from_slice(&data[23..39]);

        let service = ServiceIdentifier::from_u8(data[39])
            .ok_or_else(|| ChirpError::Decode { reason: format!("service identifier {} invalid", data[39]) })?;
        let port = u16::from(data[40]) | (u16::from(data[41]) << 8);

        Ok(ChirpMessage {
            msg_type,
            group_id: Md5Hash::from_bytes(group),
            host_id: Md5Hash::from_bytes(host),
            service,
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_beacon_bytes() {
        let msg = ChirpMessage::from_names(
            ChirpMessageType::Request,
            "edda",
            "chirp_manager",
            ServiceIdentifier::Control,
            47890,
        );
        let bytes = msg.assemble();
        assert_eq!(bytes.len(), 42);
        assert_eq!(&bytes[0..6], b"CHIRP\x01");
        assert_eq!(bytes[6], 0x01);
        assert_eq!(&bytes[7..23], Md5Hash::from_name("edda").as_bytes());
        assert_eq!(&bytes[23..39], Md5Hash::from_name("chirp_manager").as_bytes());
        assert_eq!(bytes[39], 0x01);
        // 47890 = 0xbb12, little endian on the wire
        assert_eq!(bytes[40], 0x12);
        assert_eq!(bytes[41], 0xbb);
    }

    #[test]
    fn test_roundtrip_all_types_and_services() {
        for msg_type in [ChirpMessageType::Request, ChirpMessageType::Offer, ChirpMessageType::Depart] {
            for service in [
                ServiceIdentifier::Control,
                ServiceIdentifier::Heartbeat,
                ServiceIdentifier::Monitoring,
                ServiceIdentifier::Data,
            ] {
                let msg = ChirpMessage::from_names(msg_type, "group", "host", service, 50123);
                let decoded = ChirpMessage::disassemble(&msg.assemble()).unwrap();
                assert_eq!(decoded, msg);
            }
        }
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let msg = ChirpMessage::from_names(ChirpMessageType::Offer, "g", "h", ServiceIdentifier::Data, 1);
        let bytes = msg.assemble();
        assert!(ChirpMessage::disassemble(&bytes[..41]).is_err());
        let mut long = bytes.to_vec();
        long.push(0);
        assert!(ChirpMessage::disassemble(&long).is_err());
    }

    #[test]
    fn test_bad_header_is_rejected() {
        let msg = ChirpMessage::from_names(ChirpMessageType::Offer, "g", "h", ServiceIdentifier::Data, 1);
        let mut bytes = msg.assemble();
        bytes[0] = b'X';
        assert!(ChirpMessage::disassemble(&bytes).is_err());

        let mut bytes = msg.assemble();
        bytes[5] = 0x02; // unknown version
        assert!(ChirpMessage::disassemble(&bytes).is_err());
    }

    #[test]
    fn test_bad_type_and_service_are_rejected() {
        let msg = ChirpMessage::from_names(ChirpMessageType::Offer, "g", "h", ServiceIdentifier::Data, 1);
        let mut bytes = msg.assemble();
        bytes[6] = 0x04;
        assert!(ChirpMessage::disassemble(&bytes).is_err());

        let mut bytes = msg.assemble();
        bytes[39] = 0x05;
        assert!(ChirpMessage::disassemble(&bytes).is_err());
    }
}
