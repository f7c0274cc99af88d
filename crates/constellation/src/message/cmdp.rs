// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CMDP monitoring messages: a topic frame, a header frame and a payload
//! frame.
//!
//! Topics follow `LOG/<LEVEL>[/<TOPIC>]` for log records and
//! `STAT/<METRIC>` for metrics. Subscribers match on topic prefixes; the
//! reserved notification topics `LOG?` and `STAT?` signal subscription
//! intent to publishers.

use std::fmt;

use crate::message::{Frames, Header, MessageError, MessageResult};
use crate::protocol::Protocol;

/// Severity levels of the `LOG/` topic tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Status,
    Warning,
    Critical,
    Off,
}

impl LogLevel {
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Status => "STATUS",
            LogLevel::Warning => "WARNING",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Off => "OFF",
        }
    }

    pub fn from_name(name: &str) -> Option<LogLevel> {
        match name {
            "TRACE" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "STATUS" => Some(LogLevel::Status),
            "WARNING" => Some(LogLevel::Warning),
            "CRITICAL" => Some(LogLevel::Critical),
            "OFF" => Some(LogLevel::Off),
        _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed CMDP topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdpTopic {
    /// `LOG/<LEVEL>[/<TOPIC>]`
    Log { level: LogLevel, topic: Option<String> },
    /// `STAT/<METRIC>`
    Stat { metric: String },
    /// `LOG?` subscription notification
    LogNotification,
    /// `STAT?` subscription notification
    StatNotification,
}

impl CmdpTopic {
    pub fn log(level: LogLevel) -> Self {
        CmdpTopic::Log { level, topic: None }
    }

    pub fn log_topic(level: LogLevel, topic: impl Into<String>) -> Self {
        CmdpTopic::Log { level, topic: Some(topic.into()) }
    }

    pub fn stat(metric: impl Into<String>) -> Self {
        CmdpTopic::Stat { metric: metric.into() }
    }

    /// Parse a topic frame.
    pub fn parse(raw: &str) -> Option<CmdpTopic> {
        if raw == "LOG?" {
            return Some(CmdpTopic::LogNotification);
        }
        if raw == "STAT?" {
            return Some(CmdpTopic::StatNotification);
        }
        if let Some(rest) = raw.strip_prefix("LOG/") {
            let (level_str, topic) = match rest.split_once('/') {
                Some((level, topic)) => (level, Some(topic.to_owned())),
                None => (rest, None),
            };
            let level = LogLevel::from_name(level_str)?;
            return Some(CmdpTopic::Log { level, topic });
        }
        if let Some(metric) = raw.strip_prefix("STAT/") {
            if metric.is_empty() {
                return None;
            }
            return Some(CmdpTopic::Stat { metric: metric.to_owned() });
        }
        None
    }
}

impl fmt::Display for CmdpTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdpTopic::Log { level, topic: None } => write!(f, "LOG/{}", level),
            CmdpTopic::Log { level, topic: Some(topic) } => write!(f, "LOG/{}/{}", level, topic),
            CmdpTopic::Stat { metric } => write!(f, "STAT/{}", metric),
            CmdpTopic::LogNotification => f.write_str("LOG?"),
            CmdpTopic::StatNotification => f.write_str("STAT?"),
        }
    }
}

/// A CMDP monitoring message.
#[derive(Debug, Clone)]
pub struct CmdpMessage {
    topic: String,
    header: Header,
    payload: Vec<u8>,
}

impl CmdpMessage {
    pub fn new(sender: impl Into<String>, topic: &CmdpTopic, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.to_string(),
            header: Header::new(Protocol::Cmdp1, sender),
            payload,
        }
    }

    /// Build a log record with a UTF-8 text payload.
    pub fn log_record(sender: impl Into<String>, level: LogLevel, topic: Option<&str>, text: &str) -> Self {
        let topic = match topic {
            Some(topic) => CmdpTopic::log_topic(level, topic),
            None => CmdpTopic::log(level),
        };
        Self::new(sender, &topic, text.as_bytes().to_vec())
    }

    pub fn raw_topic(&self) -> &str {
        &self.topic
    }

    pub fn topic(&self) -> Option<CmdpTopic> {
        CmdpTopic::parse(&self.topic)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Log record payload as text, if this is a `LOG/` message.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn assemble(&self) -> Frames {
        vec![self.topic.as_bytes().to_vec(), self.header.assemble(), self.payload.clone()]
    }

    pub fn disassemble(frames: &[Vec<u8>]) -> MessageResult<CmdpMessage> {
        if frames.len() != 3 {
            return Err(MessageError::IncorrectFrameCount);
        }
        let topic = std::str::from_utf8(&frames[0])
            .map_err(|_| MessageError::DecodeFailure { reason: "topic frame is not valid UTF-8".into() })?
            .to_owned();
        let header = Header::disassemble(Protocol::Cmdp1, &frames[1])?;
        Ok(CmdpMessage { topic, header, payload: frames[2].clone() })
    }
}
