// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration dictionaries carried in message tags and transition payloads.
//!
//! A [`Dictionary`] is a string-keyed map of [`Value`]s, the value domain
//! shared by header tags, `initialize`/`reconfigure` payloads and
//! `get_commands`/`get_config` replies. [`Configuration`] adds typed access
//! on top for satellite implementations.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use crate::protocol::pack::{PackError, PackReader, PackResult, PackWriter};

/// A single tag or configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Timestamp(SystemTime),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn pack(&self, writer: &mut PackWriter) {
        match self {
            Value::Bool(value) => writer.put_bool(*value),
            Value::I64(value) => writer.put_i64(*value),
            Value::F64(value) => writer.put_f64(*value),
            Value::Text(value) => writer.put_str(value),
            Value::Timestamp(value) => writer.put_timestamp(*value),
            Value::Bytes(value) => writer.put_bin(value),
        }
    }

    /// Decode the next value, dispatching on the marker byte.
    pub fn unpack(reader: &mut PackReader<'_>) -> PackResult<Value> {
        let marker = reader.peek()?;
        match marker {
            0xc2 | 0xc3 => Ok(Value::Bool(reader.get_bool()?)),
            0x00..=0x7f | 0xcc..=0xcf | 0xd0..=0xd3 | 0xe0..=0xff => Ok(Value::I64(reader.get_i64()?)),
            0xca | 0xcb => Ok(Value::F64(reader.get_f64()?)),
            0xa0..=0xbf | 0xd9..=0xdb => Ok(Value::Text(reader.get_str()?)),
            0xd6 | 0xd7 | 0xc7 => Ok(Value::Timestamp(reader.get_timestamp()?)),
            0xc4..=0xc6 => Ok(Value::Bytes(reader.get_bin()?)),
            found => Err(PackError::UnexpectedType {
                offset: reader.offset(),
                expected: "tag value",
                found,
            }),
        }
    }

    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I64(_) => "int",
            Value::F64(_) => "float",
            Value::Text(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(value) => write!(f, "{}", value),
            Value::I64(value) => write!(f, "{}", value),
            Value::F64(value) => write!(f, "{}", value),
            Value::Text(value) => f.write_str(value),
            Value::Timestamp(value) => write!(f, "{:?}", value),
            Value::Bytes(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::I64(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<SystemTime> for Value {
    fn from(value: SystemTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

/// Ordered string-keyed map of values. Encodes as a MessagePack map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: BTreeMap<String, Value>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Merge `other` into `self`, overwriting existing keys. Used for
    /// partial reconfiguration.
    pub fn merge(&mut self, other: &Dictionary) {
        for (key, value) in other.iter() {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn pack(&self, writer: &mut PackWriter) {
        writer.put_map_len(self.entries.len());
        for (key, value) in &self.entries {
            writer.put_str(key);
            value.pack(writer);
        }
    }

    pub fn unpack(reader: &mut PackReader<'_>) -> PackResult<Dictionary> {
        let len = reader.get_map_len()?;
        let mut entries = BTreeMap::new();
        for _ in 0..len {
            let key = reader.get_str()?;
            let value = Value::unpack(reader)?;
            entries.insert(key, value);
        }
        Ok(Dictionary { entries })
    }

    /// Encode as a standalone payload frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = PackWriter::new();
        self.pack(&mut writer);
        writer.into_bytes()
    }

    /// Decode from a standalone payload frame.
    pub fn from_bytes(data: &[u8]) -> PackResult<Dictionary> {
        let mut reader = PackReader::new(data);
        Self::unpack(&mut reader)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut dict = Dictionary::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}

/// Typed-access error for [`Configuration`].
#[derive(Debug, Clone)]
pub enum ConfigError {
    MissingKey { key: String },
    WrongType { key: String, expected: &'static str, found: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingKey { key } => write!(f, "configuration key \"{}\" is missing", key),
            ConfigError::WrongType { key, expected, found } => {
                write!(f, "configuration key \"{}\" has type {}, expected {}", key, found, expected)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A satellite configuration with typed getters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    dict: Dictionary,
}

impl Configuration {
    pub fn new(dict: Dictionary) -> Self {
        Self { dict }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.dict.insert(key, value);
    }

    /// Apply a partial configuration on top of this one.
    pub fn update(&mut self, partial: &Configuration) {
        self.dict.merge(&partial.dict);
    }

    pub fn has(&self, key: &str) -> bool {
        self.dict.contains_key(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        match self.require(key)? {
            Value::Bool(value) => Ok(*value),
            other => Err(self.wrong_type(key, "bool", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        match self.require(key)? {
            Value::I64(value) => Ok(*value),
            other => Err(self.wrong_type(key, "int", other)),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<f64, ConfigError> {
        match self.require(key)? {
            Value::F64(value) => Ok(*value),
            Value::I64(value) => Ok(*value as f64),
            other => Err(self.wrong_type(key, "float", other)),
        }
    }

    pub fn get_text(&self, key: &str) -> Result<&str, ConfigError> {
        match self.require(key)? {
            Value::Text(value) => Ok(value),
            other => Err(self.wrong_type(key, "string", other)),
        }
    }

    pub fn get_timestamp(&self, key: &str) -> Result<SystemTime, ConfigError> {
        match self.require(key)? {
            Value::Timestamp(value) => Ok(*value),
            other => Err(self.wrong_type(key, "timestamp", other)),
        }
    }

    pub fn get_bytes(&self, key: &str) -> Result<&[u8], ConfigError> {
        match self.require(key)? {
            Value::Bytes(value) => Ok(value),
            other => Err(self.wrong_type(key, "bytes", other)),
        }
    }

    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        if self.has(key) {
            self.get_int(key)
        } else {
            Ok(default)
        }
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        if self.has(key) {
            self.get_bool(key)
        } else {
            Ok(default)
        }
    }

    fn require(&self, key: &str) -> Result<&Value, ConfigError> {
        self.dict.get(key).ok_or_else(|| ConfigError::MissingKey { key: key.to_owned() })
    }

    fn wrong_type(&self, key: &str, expected: &'static str, found: &Value) -> ConfigError {
        ConfigError::WrongType { key: key.to_owned(), expected, found: found.type_name() }
    }
}
