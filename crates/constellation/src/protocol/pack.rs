// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MsgPack encoding/decoding for message headers and payload dictionaries.
//!
//! Implements the subset of the MessagePack format the four wire protocols
//! use: booleans, integers, doubles, strings, binary blobs, maps, arrays and
//! the timestamp extension. Timestamps round-trip at nanosecond resolution.
//!
//! All multi-byte fields are big-endian per the MessagePack specification.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Decoding error within `protocol::pack`.
#[derive(Debug, Clone)]
pub enum PackError {
    ReadFailed { offset: usize, reason: String },
    UnexpectedType { offset: usize, expected: &'static str, found: u8 },
    InvalidData { reason: String },
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackError::ReadFailed { offset, reason } => {
                write!(f, "read failed at offset {}: {}", offset, reason)
            }
            PackError::UnexpectedType { offset, expected, found } => {
                write!(f, "unexpected type at offset {}: expected {}, found marker {:#04x}", offset, expected, found)
            }
            PackError::InvalidData { reason } => write!(f, "invalid data: {}", reason),
        }
    }
}

impl std::error::Error for PackError {}

pub type PackResult<T> = core::result::Result<T, PackError>;

const NIL: u8 = 0xc0;
const FALSE: u8 = 0xc2;
const TRUE: u8 = 0xc3;
const BIN8: u8 = 0xc4;
const BIN16: u8 = 0xc5;
const BIN32: u8 = 0xc6;
const EXT8: u8 = 0xc7;
const F32: u8 = 0xca;
const F64: u8 = 0xcb;
const UINT8: u8 = 0xcc;
const UINT16: u8 = 0xcd;
const UINT32: u8 = 0xce;
const UINT64: u8 = 0xcf;
const INT8: u8 = 0xd0;
const INT16: u8 = 0xd1;
const INT32: u8 = 0xd2;
const INT64: u8 = 0xd3;
const FIXEXT4: u8 = 0xd6;
const FIXEXT8: u8 = 0xd7;
const STR8: u8 = 0xd9;
const STR16: u8 = 0xda;
const STR32: u8 = 0xdb;
const ARRAY16: u8 = 0xdc;
const ARRAY32: u8 = 0xdd;
const MAP16: u8 = 0xde;
const MAP32: u8 = 0xdf;

/// Extension type id of the MessagePack timestamp extension.
const EXT_TIMESTAMP: i8 = -1;

/// Growable MessagePack writer.
#[derive(Debug, Default)]
pub struct PackWriter {
    buf: Vec<u8>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(64) }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_nil(&mut self) {
        self.buf.push(NIL);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(if value { TRUE } else { FALSE });
    }

    /// Write an unsigned integer using the shortest encoding.
    pub fn put_u64(&mut self, value: u64) {
        if value <= 0x7f {
            self.buf.push(value as u8);
        } else if value <= u64::from(u8::MAX) {
            self.buf.push(UINT8);
            self.buf.push(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.buf.push(UINT16);
            self.buf.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.buf.push(UINT32);
            self.buf.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buf.push(UINT64);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    /// Write a signed integer using the shortest encoding.
    pub fn put_i64(&mut self, value: i64) {
        if value >= 0 {
            self.put_u64(value as u64);
        } else if value >= -32 {
            self.buf.push(value as u8);
        } else if value >= i64::from(i8::MIN) {
            self.buf.push(INT8);
            self.buf.push(value as u8);
        } else if value >= i64::from(i16::MIN) {
            self.buf.push(INT16);
            self.buf.extend_from_slice(&(value as i16).to_be_bytes());
        } else if value >= i64::from(i32::MIN) {
            self.buf.push(INT32);
            self.buf.extend_from_slice(&(value as i32).to_be_bytes());
        } else {
            self.buf.push(INT64);
            self.buf.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.push(F64);
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn put_str(&mut self, value: &str) {
        let len = value.len();
        if len <= 31 {
            self.buf.push(0xa0 | len as u8);
        } else if len <= usize::from(u8::MAX) {
            self.buf.push(STR8);
            self.buf.push(len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(STR16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(STR32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn put_bin(&mut self, value: &[u8]) {
        let len = value.len();
        if len <= usize::from(u8::MAX) {
            self.buf.push(BIN8);
            self.buf.push(len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(BIN16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(BIN32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.buf.extend_from_slice(value);
    }

    pub fn put_map_len(&mut self, len: usize) {
        if len <= 15 {
            self.buf.push(0x80 | len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(MAP16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(MAP32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    pub fn put_array_len(&mut self, len: usize) {
        if len <= 15 {
            self.buf.push(0x90 | len as u8);
        } else if len <= usize::from(u16::MAX) {
            self.buf.push(ARRAY16);
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.buf.push(ARRAY32);
            self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }

    /// Write a timestamp using the `-1` extension. Picks timestamp 32/64/96
    /// depending on range, preserving nanoseconds.
    pub fn put_timestamp(&mut self, time: SystemTime) {
        match time.duration_since(UNIX_EPOCH) {
            Ok(since) => {
                let secs = since.as_secs();
                let nanos = since.subsec_nanos();
                if secs >> 34 == 0 {
                    let packed = (u64::from(nanos) << 34) | secs;
                    if packed & 0xffff_ffff_0000_0000 == 0 {
                        // timestamp 32: seconds only
                        self.buf.push(FIXEXT4);
                        self.buf.push(EXT_TIMESTAMP as u8);
                        self.buf.extend_from_slice(&(secs as u32).to_be_bytes());
                    } else {
                        // timestamp 64: 30-bit nanoseconds, 34-bit seconds
                        self.buf.push(FIXEXT8);
                        self.buf.push(EXT_TIMESTAMP as u8);
                        self.buf.extend_from_slice(&packed.to_be_bytes());
                    }
                } else {
                    self.put_timestamp96(secs as i64, nanos);
                }
            }
            Err(err) => {
                // Pre-epoch times only occur with a badly skewed clock, keep
                // them representable via timestamp 96.
                let before = err.duration();
                let mut secs = -(before.as_secs() as i64);
                let mut nanos = before.subsec_nanos();
                if nanos > 0 {
                    secs -= 1;
                    nanos = 1_000_000_000 - nanos;
                }
                self.put_timestamp96(secs, nanos);
            }
        }
    }

    fn put_timestamp96(&mut self, secs: i64, nanos: u32) {
        self.buf.push(EXT8);
        self.buf.push(12);
        self.buf.push(EXT_TIMESTAMP as u8);
        self.buf.extend_from_slice(&nanos.to_be_bytes());
        self.buf.extend_from_slice(&secs.to_be_bytes());
    }
}

/// Bounds-checked MessagePack reader over a borrowed frame.
#[derive(Debug)]
pub struct PackReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PackReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Peek the next marker byte without consuming it.
    pub fn peek(&self) -> PackResult<u8> {
        self.data.get(self.offset).copied().ok_or_else(|| self.eof())
    }

    fn eof(&self) -> PackError {
        PackError::ReadFailed { offset: self.offset, reason: "unexpected end of buffer".into() }
    }

    fn take(&mut self, count: usize) -> PackResult<&'a [u8]> {
        if self.offset + count > self.data.len() {
            return Err(self.eof());
        }
        let slice = &self.data[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    fn take_u8(&mut self) -> PackResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> PackResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn take_u32(&mut self) -> PackResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_u64(&mut self) -> PackResult<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn get_bool(&mut self) -> PackResult<bool> {
        let offset = self.offset;
        match self.take_u8()? {
            TRUE => Ok(true),
            FALSE => Ok(false),
            found => Err(PackError::UnexpectedType { offset, expected: "bool", found }),
        }
    }

    pub fn get_u64(&mut self) -> PackResult<u64> {
        let offset = self.offset;
        let marker = self.take_u8()?;
        match marker {
            0x00..=0x7f => Ok(u64::from(marker)),
            UINT8 => Ok(u64::from(self.take_u8()?)),
            UINT16 => Ok(u64::from(self.take_u16()?)),
            UINT32 => Ok(u64::from(self.take_u32()?)),
            UINT64 => self.take_u64(),
            _ => Err(PackError::UnexpectedType { offset, expected: "unsigned integer", found: marker }),
        }
    }

    pub fn get_i64(&mut self) -> PackResult<i64> {
        let offset = self.offset;
        let marker = self.peek()?;
        match marker {
            0xe0..=0xff => {
                self.take_u8()?;
                Ok(i64::from(marker as i8))
            }
            INT8 => {
                self.take_u8()?;
                Ok(i64::from(self.take_u8()? as i8))
            }
            INT16 => {
                self.take_u8()?;
                Ok(i64::from(self.take_u16()? as i16))
            }
            INT32 => {
                self.take_u8()?;
                Ok(i64::from(self.take_u32()? as i32))
            }
            INT64 => {
                self.take_u8()?;
                Ok(self.take_u64()? as i64)
            }
            _ => {
                let value = self.get_u64().map_err(|_| PackError::UnexpectedType {
                    offset,
                    expected: "integer",
                    found: marker,
                })?;
                i64::try_from(value).map_err(|_| PackError::InvalidData {
                    reason: format!("unsigned value {} exceeds signed range", value),
                })
            }
        }
    }

    pub fn get_f64(&mut self) -> PackResult<f64> {
        let offset = self.offset;
        match self.take_u8()? {
            F64 => Ok(f64::from_bits(self.take_u64()?)),
            F32 => Ok(f64::from(f32::from_bits(self.take_u32()?))),
            found => Err(PackError::UnexpectedType { offset, expected: "float", found }),
        }
    }

    pub fn get_str(&mut self) -> PackResult<String> {
        let offset = self.offset;
        let marker = self.take_u8()?;
        let len = match marker {
            0xa0..=0xbf => usize::from(marker & 0x1f),
            STR8 => usize::from(self.take_u8()?),
            STR16 => usize::from(self.take_u16()?),
            STR32 => self.take_u32()? as usize,
            found => return Err(PackError::UnexpectedType { offset, expected: "string", found }),
        };
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| PackError::InvalidData { reason: "string is not valid UTF-8".into() })
    }

    pub fn get_bin(&mut self) -> PackResult<Vec<u8>> {
        let offset = self.offset;
        let marker = self.take_u8()?;
        let len = match marker {
            BIN8 => usize::from(self.take_u8()?),
            BIN16 => usize::from(self.take_u16()?),
            BIN32 => self.take_u32()? as usize,
            found => return Err(PackError::UnexpectedType { offset, expected: "binary", found }),
        };
        Ok(self.take(len)?.to_vec())
    }

    pub fn get_map_len(&mut self) -> PackResult<usize> {
        let offset = self.offset;
        let marker = self.take_u8()?;
        match marker {
            0x80..=0x8f => Ok(usize::from(marker & 0x0f)),
            MAP16 => Ok(usize::from(self.take_u16()?)),
            MAP32 => Ok(self.take_u32()? as usize),
            found => Err(PackError::UnexpectedType { offset, expected: "map", found }),
        }
    }

    pub fn get_array_len(&mut self) -> PackResult<usize> {
        let offset = self.offset;
        let marker = self.take_u8()?;
        match marker {
            0x90..=0x9f => Ok(usize::from(marker & 0x0f)),
            ARRAY16 => Ok(usize::from(self.take_u16()?)),
            ARRAY32 => Ok(self.take_u32()? as usize),
            found => Err(PackError::UnexpectedType { offset, expected: "array", found }),
        }
    }

    /// Read a timestamp extension in any of its three encodings.
    pub fn get_timestamp(&mut self) -> PackResult<SystemTime> {
        let offset = self.offset;
        let marker = self.take_u8()?;
        let (ext_type, data_len) = match marker {
            FIXEXT4 => (self.take_u8()? as i8, 4),
            FIXEXT8 => (self.take_u8()? as i8, 8),
            EXT8 => {
                let len = usize::from(self.take_u8()?);
                (self.take_u8()? as i8, len)
            }
            found => return Err(PackError::UnexpectedType { offset, expected: "timestamp", found }),
        };
        if ext_type != EXT_TIMESTAMP {
            return Err(PackError::InvalidData { reason: format!("extension type {} is not a timestamp", ext_type) });
        }
        match data_len {
            4 => {
                let secs = self.take_u32()?;
                Ok(UNIX_EPOCH + Duration::from_secs(u64::from(secs)))
            }
            8 => {
                let packed = self.take_u64()?;
                let nanos = (packed >> 34) as u32;
                let secs = packed & 0x0003_ffff_ffff;
                if nanos >= 1_000_000_000 {
                    return Err(PackError::InvalidData { reason: "timestamp nanoseconds out of range".into() });
                }
                Ok(UNIX_EPOCH + Duration::new(secs, nanos))
            }
            12 => {
                let nanos = self.take_u32()?;
                let secs = self.take_u64()? as i64;
                if nanos >= 1_000_000_000 {
                    return Err(PackError::InvalidData { reason: "timestamp nanoseconds out of range".into() });
                }
                if secs >= 0 {
                    Ok(UNIX_EPOCH + Duration::new(secs as u64, nanos))
                } else {
                    let before = Duration::new((-(secs + 1)) as u64, 1_000_000_000 - nanos);
                    Ok(UNIX_EPOCH - before)
                }
            }
            other => Err(PackError::InvalidData { reason: format!("timestamp extension length {} invalid", other) }),
        }
    }

    /// Skip one complete value of any supported type. Used to step over
    /// unknown tag values without interpreting them.
    pub fn skip_value(&mut self) -> PackResult<()> {
        let offset = self.offset;
        let marker = self.peek()?;
        match marker {
            0x00..=0x7f | 0xe0..=0xff => {
                self.take_u8()?;
                Ok(())
            }
            NIL | TRUE | FALSE => {
                self.take_u8()?;
                Ok(())
            }
            UINT8 | INT8 => {
                self.take(2)?;
                Ok(())
            }
            UINT16 | INT16 => {
                self.take(3)?;
                Ok(())
            }
            UINT32 | INT32 | F32 => {
                self.take(5)?;
                Ok(())
            }
            UINT64 | INT64 | F64 => {
                self.take(9)?;
                Ok(())
            }
            0xa0..=0xbf | STR8 | STR16 | STR32 => self.get_str().map(|_| ()),
            BIN8 | BIN16 | BIN32 => self.get_bin().map(|_| ()),
            FIXEXT4 | FIXEXT8 | EXT8 => self.get_timestamp().map(|_| ()),
            0x80..=0x8f | MAP16 | MAP32 => {
                let len = self.get_map_len()?;
                for _ in 0..len {
                    self.skip_value()?;
                    self.skip_value()?;
                }
                Ok(())
            }
            0x90..=0x9f | ARRAY16 | ARRAY32 => {
                let len = self.get_array_len()?;
                for _ in 0..len {
                    self.skip_value()?;
                }
                Ok(())
            }
            found => Err(PackError::UnexpectedType { offset, expected: "value", found }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_encodings() {
        let mut writer = PackWriter::new();
        writer.put_u64(0x7f);
        writer.put_u64(0xff);
        writer.put_u64(0xffff);
        writer.put_u64(0xffff_ffff);
        writer.put_u64(u64::MAX);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0x7f);
        assert_eq!(bytes[1], 0xcc);
        assert_eq!(bytes[3], 0xcd);
        assert_eq!(bytes[6], 0xce);
        assert_eq!(bytes[11], 0xcf);

        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_u64().unwrap(), 0x7f);
        assert_eq!(reader.get_u64().unwrap(), 0xff);
        assert_eq!(reader.get_u64().unwrap(), 0xffff);
        assert_eq!(reader.get_u64().unwrap(), 0xffff_ffff);
        assert_eq!(reader.get_u64().unwrap(), u64::MAX);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_int_roundtrip() {
        let values = [0i64, -1, -32, -33, -128, -129, i64::from(i16::MIN), i64::from(i32::MIN), i64::MIN, 42, i64::MAX];
        let mut writer = PackWriter::new();
        for value in values {
            writer.put_i64(value);
        }
        let bytes = writer.into_bytes();
        let mut reader = PackReader::new(&bytes);
        for value in values {
            assert_eq!(reader.get_i64().unwrap(), value);
        }
    }

    #[test]
    fn test_str_roundtrip() {
        let mut writer = PackWriter::new();
        writer.put_str("");
        writer.put_str("edda");
        let long = "x".repeat(300);
        writer.put_str(&long);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0xa0);
        assert_eq!(bytes[1], 0xa4);

        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_str().unwrap(), "");
        assert_eq!(reader.get_str().unwrap(), "edda");
        assert_eq!(reader.get_str().unwrap(), long);
    }

    #[test]
    fn test_bin_roundtrip() {
        let mut writer = PackWriter::new();
        writer.put_bin(&[0xde, 0xad, 0xbe, 0xef]);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0xc4);
        assert_eq!(bytes[1], 4);
        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_bin().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_f64_roundtrip() {
        let mut writer = PackWriter::new();
        writer.put_f64(3.25);
        writer.put_f64(-0.0);
        let bytes = writer.into_bytes();
        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_f64().unwrap(), 3.25);
        assert_eq!(reader.get_f64().unwrap().to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn test_timestamp_nanosecond_roundtrip() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let mut writer = PackWriter::new();
        writer.put_timestamp(time);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0xd7); // timestamp 64
        assert_eq!(bytes[1], 0xff); // ext type -1
        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_timestamp().unwrap(), time);
    }

    #[test]
    fn test_timestamp_seconds_only_uses_timestamp32() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut writer = PackWriter::new();
        writer.put_timestamp(time);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0xd6);
        assert_eq!(bytes.len(), 6);
        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_timestamp().unwrap(), time);
    }

    #[test]
    fn test_timestamp96_roundtrip() {
        let time = UNIX_EPOCH + Duration::new(1u64 << 35, 999_999_999);
        let mut writer = PackWriter::new();
        writer.put_timestamp(time);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0xc7);
        assert_eq!(bytes[1], 12);
        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_timestamp().unwrap(), time);
    }

    #[test]
    fn test_pre_epoch_timestamp_roundtrip() {
        let time = UNIX_EPOCH - Duration::new(5, 250_000_000);
        let mut writer = PackWriter::new();
        writer.put_timestamp(time);
        let bytes = writer.into_bytes();
        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_timestamp().unwrap(), time);
    }

    #[test]
    fn test_map_and_array_lengths() {
        let mut writer = PackWriter::new();
        writer.put_map_len(3);
        writer.put_array_len(17);
        let bytes = writer.into_bytes();
        assert_eq!(bytes[0], 0x83);
        assert_eq!(bytes[1], 0xdc);
        let mut reader = PackReader::new(&bytes);
        assert_eq!(reader.get_map_len().unwrap(), 3);
        assert_eq!(reader.get_array_len().unwrap(), 17);
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let mut writer = PackWriter::new();
        writer.put_str("truncate me please");
        let bytes = writer.into_bytes();
        let mut reader = PackReader::new(&bytes[..bytes.len() - 1]);
        assert!(reader.get_str().is_err());
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut writer = PackWriter::new();
        writer.put_u64(17);
        let bytes = writer.into_bytes();
        let mut reader = PackReader::new(&bytes);
        assert!(matches!(reader.get_str(), Err(PackError::UnexpectedType { .. })));
    }

    #[test]
    fn test_skip_value_over_nested_map() {
        let mut writer = PackWriter::new();
        writer.put_map_len(2);
        writer.put_str("a");
        writer.put_array_len(2);
        writer.put_u64(1);
        writer.put_bool(true);
        writer.put_str("b");
        writer.put_bin(&[1, 2, 3]);
        writer.put_str("sentinel");
        let bytes = writer.into_bytes();
        let mut reader = PackReader::new(&bytes);
        reader.skip_value().unwrap();
        assert_eq!(reader.get_str().unwrap(), "sentinel");
    }
}
