// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Satellite side of the fabric: the user-facing [`Satellite`] trait, the
//! lifecycle [`Fsm`] and the CSCP command endpoint.
//!
//! A satellite type implements the capability set (initializing,
//! launching, landing, reconfiguring, starting, stopping, running,
//! interrupting, on_failure) as trait methods. Transition actions run on a
//! dedicated worker and must observe their [`StopToken`]; they complete by
//! returning `Ok` and fail with a typed [`SatelliteError`]. Panics are
//! never used for control flow.

mod fsm;
mod handler;
mod registry;

pub use fsm::Fsm;
pub use handler::SatelliteHandler;
pub use registry::{SatelliteGenerator, SatelliteRegistry};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{ConfigError, Configuration};
use crate::protocol::State;

/// Cancellation handle observed by transition actions and the run loop.
///
/// Raised when a superseding command arrives or the process shuts down.
/// Actions should poll it at natural boundaries and return promptly once
/// it is set.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once cancellation has been requested.
    pub fn stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Typed failure of a transition action.
#[derive(Debug)]
pub enum SatelliteError {
    /// Configuration is missing keys or has wrong value types.
    Config(ConfigError),
    /// The controlled device or environment misbehaved.
    Device { reason: String },
    /// The action observed its stop token and aborted.
    Aborted,
}

impl SatelliteError {
    /// Shorthand for a device failure.
    pub fn device(reason: impl Into<String>) -> Self {
        SatelliteError::Device { reason: reason.into() }
    }
}

impl fmt::Display for SatelliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SatelliteError::Config(err) => write!(f, "{}", err),
            SatelliteError::Device { reason } => write!(f, "{}", reason),
            SatelliteError::Aborted => f.write_str("action was aborted"),
        }
    }
}

impl std::error::Error for SatelliteError {}

impl From<ConfigError> for SatelliteError {
    fn from(err: ConfigError) -> Self {
        SatelliteError::Config(err)
    }
}

/// A satellite type: user logic behind the lifecycle FSM.
///
/// All methods have conservative defaults, so a minimal satellite only
/// implements what it needs. Implementations are driven from the
/// transition worker thread, one action at a time.
pub trait Satellite: Send + 'static {
    /// Name of the satellite type, the first half of the canonical name.
    fn type_name(&self) -> &str;

    /// Instance name, the second half of the canonical name.
    fn satellite_name(&self) -> &str;

    /// Canonical name `<type>.<instance>`, globally unique within a
    /// constellation.
    fn canonical_name(&self) -> String {
        format!("{}.{}", self.type_name(), self.satellite_name())
    }

    /// Whether the `reconfigure` transition is supported. Disabled by
    /// default; the FSM replies INVALID while disabled.
    fn supports_reconfigure(&self) -> bool {
        false
    }

    /// Initialize, e.g. check the configuration and connect the device.
    fn initializing(&mut self, _token: &StopToken, _config: &Configuration) -> Result<(), SatelliteError> {
        log::info!("[{}] initializing (default)", self.canonical_name());
        Ok(())
    }

    /// Launch, i.e. apply the stored configuration.
    fn launching(&mut self, _token: &StopToken) -> Result<(), SatelliteError> {
        log::info!("[{}] launching (default)", self.canonical_name());
        Ok(())
    }

    /// Land, i.e. undo what `launching` did.
    fn landing(&mut self, _token: &StopToken) -> Result<(), SatelliteError> {
        log::info!("[{}] landing (default)", self.canonical_name());
        Ok(())
    }

    /// Apply a partial configuration to a launched satellite.
    fn reconfiguring(&mut self, _token: &StopToken, _partial: &Configuration) -> Result<(), SatelliteError> {
        log::info!("[{}] reconfiguring (default)", self.canonical_name());
        Ok(())
    }

    /// Prepare for immediate data taking.
    fn starting(&mut self, _token: &StopToken, run_number: u32) -> Result<(), SatelliteError> {
        log::info!("[{}] starting run {} (default)", self.canonical_name(), run_number);
        Ok(())
    }

    /// Prepare to return to ORBIT, e.g. close open files.
    fn stopping(&mut self, _token: &StopToken) -> Result<(), SatelliteError> {
        log::info!("[{}] stopping (default)", self.canonical_name());
        Ok(())
    }

    /// Run loop during data taking; return promptly once the token is
    /// raised.
    fn running(&mut self, _token: &StopToken) -> Result<(), SatelliteError> {
        log::info!("[{}] running (default)", self.canonical_name());
        Ok(())
    }

    /// Move to SAFE immediately. The default stops a run if one was
    /// active, then lands.
    fn interrupting(&mut self, token: &StopToken, previous_state: State) -> Result<(), SatelliteError> {
        log::info!("[{}] interrupting from {}", self.canonical_name(), previous_state);
        if previous_state == State::Run {
            self.stopping(token)?;
        }
        self.landing(token)
    }

    /// Hook executed when entering the ERROR state.
    fn on_failure(&mut self, _token: &StopToken, previous_state: State) {
        log::warn!("[{}] entered ERROR state from {}", self.canonical_name(), previous_state);
    }
}
