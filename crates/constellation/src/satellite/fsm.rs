// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle finite state machine.
//!
//! Thirteen states, driven exclusively by CSCP transition commands and by
//! internal completion/failure events. Accepted transitions run the user
//! action on a dedicated worker thread so `get_state` stays responsive;
//! each worker carries a [`StopToken`] that is raised when a superseding
//! command arrives or the satellite shuts down. A failing action injects
//! the `failure` event: the FSM enters ERROR, records the diagnostic for
//! `get_status` and runs the `on_failure` hook.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::{Configuration, Dictionary};
use crate::message::CscpType;
use crate::protocol::pack::PackReader;
use crate::protocol::{State, TransitionCommand};
use crate::satellite::{Satellite, StopToken};

struct Shared {
    /// Current state; plain atomic so `state()` never blocks.
    state: AtomicU8,
    /// Last transition outcome or failure diagnostic.
    status: ArcSwap<String>,
    /// The user satellite; only the transition worker calls its actions.
    satellite: Mutex<Box<dyn Satellite>>,
    /// Configuration applied by initialize, merged by reconfigure.
    config: Mutex<Configuration>,
}

impl Shared {
    fn state(&self) -> State {
        // The atomic only ever holds encodings written from `State`
        State::from_u8(self.state.load(Ordering::Relaxed)).unwrap_or(State::Error)
    }

    fn set_state(&self, state: State) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    fn set_status(&self, status: impl Into<String>) {
        self.status.store(Arc::new(status.into()));
    }

    /// Inject the failure event: enter ERROR and run the user hook.
    fn fail(&self, token: &StopToken, diagnostic: String) {
        let previous = self.state();
        self.set_state(State::Error);
        self.set_status(diagnostic.clone());
        log::warn!("[FSM] {}", diagnostic);
        self.satellite.lock().on_failure(token, previous);
    }
}

struct Worker {
    token: StopToken,
    handle: JoinHandle<()>,
}

enum Action {
    Initialize(Configuration),
    Launch,
    Land,
    Reconfigure(Configuration),
    Start(u32),
    Stop,
    Interrupt { origin: State },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Initialize(_) => "initialize",
            Action::Launch => "launch",
            Action::Land => "land",
            Action::Reconfigure(_) => "reconfigure",
            Action::Start(_) => "start",
            Action::Stop => "stop",
            Action::Interrupt { .. } => "interrupt",
        }
    }
}

/// The satellite lifecycle engine (see module docs).
pub struct Fsm {
    shared: Arc<Shared>,
    canonical_name: String,
    supports_reconfigure: bool,
    /// Serializes transition admission and tracks the in-flight worker.
    slot: Mutex<Option<Worker>>,
}

impl Fsm {
    /// Create a new FSM in the NEW state.
    pub fn new(satellite: Box<dyn Satellite>) -> Fsm {
        let canonical_name = satellite.canonical_name();
        let supports_reconfigure = satellite.supports_reconfigure();
        Fsm {
            shared: Arc::new(Shared {
                state: AtomicU8::new(State::New as u8),
                status: ArcSwap::new(Arc::new(String::new())),
                satellite: Mutex::new(satellite),
                config: Mutex::new(Configuration::default()),
            }),
            canonical_name,
            supports_reconfigure,
            slot: Mutex::new(None),
        }
    }

    /// Current state (lock-free).
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// Last transition outcome or failure diagnostic.
    pub fn status(&self) -> String {
        self.shared.status.load().as_ref().clone()
    }

    /// Canonical name of the governed satellite.
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    /// Snapshot of the currently applied configuration.
    pub fn config(&self) -> Configuration {
        self.shared.config.lock().clone()
    }

    /// Whether the satellite may be destroyed in the current state.
    pub fn is_shutdown_allowed(&self) -> bool {
        self.state().is_shutdown_allowed()
    }

    /// React to a CSCP transition command: validate against the current
    /// state and payload conventions, then hand the action to the worker.
    pub fn react_command(&self, command: TransitionCommand, payload: Option<&[u8]>) -> (CscpType, String) {
        let mut slot = self.slot.lock();
        let state = self.state();

        let allowed = match command {
            TransitionCommand::Initialize => {
                matches!(state, State::New | State::Init | State::Safe | State::Error)
            }
            TransitionCommand::Launch => state == State::Init,
            TransitionCommand::Land => state == State::Orbit,
            TransitionCommand::Reconfigure => state == State::Orbit,
            TransitionCommand::Start => state == State::Orbit,
            TransitionCommand::Stop => state == State::Run,
        };
        if !allowed {
            return (
                CscpType::Invalid,
                format!("Transition {} not allowed from {} state", command, state),
            );
        }
        if command == TransitionCommand::Reconfigure && !self.supports_reconfigure {
            return (
                CscpType::Invalid,
                "Transition reconfigure is not supported by this satellite".to_owned(),
            );
        }

        let (transitional, action) = match command {
            TransitionCommand::Initialize => match decode_configuration(payload) {
                Some(config) => (State::Initializing, Action::Initialize(config)),
                None => return incomplete(command),
            },
            TransitionCommand::Reconfigure => match decode_configuration(payload) {
                Some(partial) => (State::Reconfiguring, Action::Reconfigure(partial)),
                None => return incomplete(command),
            },
            TransitionCommand::Start => match decode_run_number(payload) {
                Some(run_number) => (State::Starting, Action::Start(run_number)),
                None => return incomplete(command),
            },
            TransitionCommand::Launch => (State::Launching, Action::Launch),
            TransitionCommand::Land => (State::Landing, Action::Land),
            TransitionCommand::Stop => (State::Stopping, Action::Stop),
        };

        let name = action.name();
        self.spawn_worker(&mut slot, transitional, action);
        (CscpType::Success, format!("Transition {} is being initiated", name))
    }

    /// Internal interrupt event (heartbeat manager, operator emergency):
    /// moves ORBIT/RUN satellites towards SAFE. Ignored in other states.
    pub fn interrupt(&self, reason: &str) {
        let mut slot = self.slot.lock();
        let state = self.state();
        if !matches!(state, State::Orbit | State::Run) {
            log::debug!("[FSM] ignoring interrupt in {} state: {}", state, reason);
            return;
        }
        log::warn!("[FSM] interrupting from {} state: {}", state, reason);
        self.shared.set_status(reason.to_owned());
        self.spawn_worker(&mut slot, State::Interrupting, Action::Interrupt { origin: state });
    }

    /// Cancel the in-flight transition (if any) and wait for the worker to
    /// return. Called before destroying the satellite.
    pub fn shutdown(&self) {
        let worker = self.slot.lock().take();
        if let Some(worker) = worker {
            worker.token.request_stop();
            let _ = worker.handle.join();
        }
    }

    /// Move to the transitional state and start the action worker. The
    /// previous worker's token is raised and the worker joined before the
    /// new action runs, so actions never overlap.
    fn spawn_worker(&self, slot: &mut Option<Worker>, transitional: State, action: Action) {
        let previous = slot.take();
        self.shared.set_state(transitional);

        let token = StopToken::new();
        let shared = Arc::clone(&self.shared);
        let worker_token = token.clone();
        let handle = thread::spawn(move || {
            if let Some(previous) = previous {
                previous.token.request_stop();
                let _ = previous.handle.join();
            }
            execute_action(&shared, &worker_token, action);
        });
        *slot = Some(Worker { token, handle });
    }
}

impl Drop for Fsm {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn incomplete(command: TransitionCommand) -> (CscpType, String) {
    (CscpType::Incomplete, format!("Transition {} received incorrect payload", command))
}

/// initialize/reconfigure carry a configuration dictionary payload.
fn decode_configuration(payload: Option<&[u8]>) -> Option<Configuration> {
    let payload = payload?;
    Dictionary::from_bytes(payload).ok().map(Configuration::new)
}

/// start carries a uint32 run number payload.
fn decode_run_number(payload: Option<&[u8]>) -> Option<u32> {
    let mut reader = PackReader::new(payload?);
    let value = reader.get_u64().ok()?;
    if !reader.is_exhausted() {
        return None;
    }
    u32::try_from(value).ok()
}

/// Run one transition action to completion, failure or cancellation.
fn execute_action(shared: &Arc<Shared>, token: &StopToken, action: Action) {
    let name = action.name();
    let outcome = match action {
        Action::Initialize(config) => {
            let result = shared.satellite.lock().initializing(token, &config);
            if result.is_ok() {
                *shared.config.lock() = config;
            }
            result.map(|()| (State::Init, "initialized"))
        }
        Action::Launch => shared.satellite.lock().launching(token).map(|()| (State::Orbit, "launched")),
        Action::Land => shared.satellite.lock().landing(token).map(|()| (State::Init, "landed")),
        Action::Reconfigure(partial) => {
            let result = shared.satellite.lock().reconfiguring(token, &partial);
            if result.is_ok() {
                shared.config.lock().update(&partial);
            }
            result.map(|()| (State::Orbit, "reconfigured"))
        }
        Action::Start(run_number) => {
            // Bind each result before matching: the satellite guard must
            // not be held while `fail` or `running` take it again.
            let started = shared.satellite.lock().starting(token, run_number);
            match started {
                Ok(()) => {
                    shared.set_state(State::Run);
                    shared.set_status(format!("started run {}", run_number));
                    log::info!("[FSM] started run {}", run_number);
                    // The run loop executes on this same worker; `stop`
                    // raises our token and takes over afterwards.
                    let ran = shared.satellite.lock().running(token);
                    if let Err(err) = ran {
                        shared.fail(token, format!("Run failed: {}", err));
                    }
                }
                Err(err) => shared.fail(token, format!("Transition start failed: {}", err)),
            }
            return;
        }
        Action::Stop => shared.satellite.lock().stopping(token).map(|()| (State::Orbit, "stopped")),
        Action::Interrupt { origin } => {
            shared.satellite.lock().interrupting(token, origin).map(|()| (State::Safe, "interrupted"))
        }
    };

    match outcome {
        Ok((steady, past_tense)) => {
            // A failure injected by a raced worker wins over completion
            if shared.state() == State::Error {
                return;
            }
            shared.set_state(steady);
            shared.set_status(past_tense);
            log::info!("[FSM] {} -> {} state", past_tense, steady);
        }
        Err(err) => shared.fail(token, format!("Transition {} failed: {}", name, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Value;
    use crate::protocol::pack::PackWriter;
    use crate::satellite::SatelliteError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Recorder {
        fail_launch: bool,
        fail_running: bool,
        reconfigurable: bool,
        on_failure_calls: Arc<AtomicU32>,
        run_started: Arc<AtomicBool>,
        run_returned_in_time: Arc<AtomicBool>,
        last_run_number: Arc<AtomicU32>,
    }

    impl Satellite for Recorder {
        fn type_name(&self) -> &str {
            "Recorder"
        }

        fn satellite_name(&self) -> &str {
            "one"
        }

        fn supports_reconfigure(&self) -> bool {
            self.reconfigurable
        }

        fn launching(&mut self, _token: &StopToken) -> Result<(), SatelliteError> {
            if self.fail_launch {
                Err(SatelliteError::device("power converter stayed dark"))
            } else {
                Ok(())
            }
        }

        fn starting(&mut self, _token: &StopToken, run_number: u32) -> Result<(), SatelliteError> {
            self.last_run_number.store(run_number, AtomicOrdering::Relaxed);
            Ok(())
        }

        fn running(&mut self, token: &StopToken) -> Result<(), SatelliteError> {
            if self.fail_running {
                return Err(SatelliteError::device("sensor dropout"));
            }
            self.run_started.store(true, AtomicOrdering::Relaxed);
            let started = Instant::now();
            while !token.stop_requested() {
                std::thread::sleep(Duration::from_millis(5));
                if started.elapsed() > Duration::from_secs(10) {
                    return Err(SatelliteError::device("run loop was never stopped"));
                }
            }
            self.run_returned_in_time.store(started.elapsed() < Duration::from_secs(10), AtomicOrdering::Relaxed);
            Ok(())
        }

        fn on_failure(&mut self, _token: &StopToken, _previous_state: State) {
            self.on_failure_calls.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    fn empty_config_payload() -> Vec<u8> {
        Dictionary::new().to_bytes()
    }

    fn run_number_payload(run: u32) -> Vec<u8> {
        let mut writer = PackWriter::new();
        writer.put_u64(u64::from(run));
        writer.into_bytes()
    }

    fn wait_for_state(fsm: &Fsm, state: State, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while fsm.state() != state {
            assert!(Instant::now() < deadline, "state {} not reached, stuck in {}", state, fsm.state());
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_fresh_satellite_is_new() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        assert_eq!(fsm.state(), State::New);
        assert_eq!(fsm.canonical_name(), "Recorder.one");
        assert!(fsm.is_shutdown_allowed());
    }

    #[test]
    fn test_initialize_reaches_init() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        let (reply, text) = fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        assert_eq!(reply, CscpType::Success);
        assert_eq!(text, "Transition initialize is being initiated");
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        assert_eq!(fsm.status(), "initialized");
    }

    #[test]
    fn test_initialize_stores_configuration() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        let mut dict = Dictionary::new();
        dict.insert("voltage", 12i64);
        let (reply, _) = fsm.react_command(TransitionCommand::Initialize, Some(&dict.to_bytes()));
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        assert_eq!(fsm.config().dictionary().get("voltage"), Some(&Value::I64(12)));
    }

    #[test]
    fn test_full_lifecycle() {
        let recorder = Recorder::default();
        let run_number = Arc::clone(&recorder.last_run_number);
        let fsm = Fsm::new(Box::new(recorder));

        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));

        let (reply, _) = fsm.react_command(TransitionCommand::Launch, None);
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));

        let (reply, _) = fsm.react_command(TransitionCommand::Start, Some(&run_number_payload(42)));
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Run, Duration::from_secs(1));
        assert_eq!(run_number.load(AtomicOrdering::Relaxed), 42);

        let (reply, _) = fsm.react_command(TransitionCommand::Stop, None);
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));

        let (reply, _) = fsm.react_command(TransitionCommand::Land, None);
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        let (reply, text) = fsm.react_command(TransitionCommand::Launch, None);
        assert_eq!(reply, CscpType::Invalid);
        assert_eq!(text, "Transition launch not allowed from NEW state");
        assert_eq!(fsm.state(), State::New);
    }

    #[test]
    fn test_missing_payload_is_incomplete() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        let (reply, text) = fsm.react_command(TransitionCommand::Initialize, None);
        assert_eq!(reply, CscpType::Incomplete);
        assert_eq!(text, "Transition initialize received incorrect payload");

        let (reply, _) = fsm.react_command(TransitionCommand::Initialize, Some(&[0xc1]));
        assert_eq!(reply, CscpType::Incomplete);
    }

    #[test]
    fn test_start_requires_run_number() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));

        let (reply, text) = fsm.react_command(TransitionCommand::Start, None);
        assert_eq!(reply, CscpType::Incomplete);
        assert_eq!(text, "Transition start received incorrect payload");

        // Out-of-range run number
        let mut writer = PackWriter::new();
        writer.put_u64(u64::from(u32::MAX) + 1);
        let (reply, _) = fsm.react_command(TransitionCommand::Start, Some(&writer.into_bytes()));
        assert_eq!(reply, CscpType::Incomplete);
    }

    #[test]
    fn test_reconfigure_gate() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));

        let (reply, text) = fsm.react_command(TransitionCommand::Reconfigure, Some(&empty_config_payload()));
        assert_eq!(reply, CscpType::Invalid);
        assert_eq!(text, "Transition reconfigure is not supported by this satellite");

        let fsm = Fsm::new(Box::new(Recorder { reconfigurable: true, ..Recorder::default() }));
        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));

        let mut partial = Dictionary::new();
        partial.insert("gain", 2i64);
        let (reply, _) = fsm.react_command(TransitionCommand::Reconfigure, Some(&partial.to_bytes()));
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));
        assert_eq!(fsm.config().dictionary().get("gain"), Some(&Value::I64(2)));
    }

    #[test]
    fn test_failed_transition_enters_error_and_runs_hook() {
        let recorder = Recorder { fail_launch: true, ..Recorder::default() };
        let hook_calls = Arc::clone(&recorder.on_failure_calls);
        let fsm = Fsm::new(Box::new(recorder));

        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Error, Duration::from_secs(1));

        assert_eq!(hook_calls.load(AtomicOrdering::Relaxed), 1);
        assert!(fsm.status().contains("power converter stayed dark"));
        // ERROR is recoverable via initialize
        let (reply, _) = fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
    }

    #[test]
    fn test_failure_during_run() {
        let recorder = Recorder { fail_running: true, ..Recorder::default() };
        let fsm = Fsm::new(Box::new(recorder));
        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Start, Some(&run_number_payload(1)));
        wait_for_state(&fsm, State::Error, Duration::from_secs(1));
        assert!(fsm.status().contains("sensor dropout"));
    }

    #[test]
    fn test_stop_cancels_run_loop_within_bound() {
        let recorder = Recorder::default();
        let run_started = Arc::clone(&recorder.run_started);
        let returned = Arc::clone(&recorder.run_returned_in_time);
        let fsm = Fsm::new(Box::new(recorder));

        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Start, Some(&run_number_payload(3)));
        wait_for_state(&fsm, State::Run, Duration::from_secs(1));

        let deadline = Instant::now() + Duration::from_secs(1);
        while !run_started.load(AtomicOrdering::Relaxed) {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }

        let cancelled_at = Instant::now();
        fsm.react_command(TransitionCommand::Stop, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));
        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
        assert!(returned.load(AtomicOrdering::Relaxed));
    }

    #[test]
    fn test_interrupt_from_run_reaches_safe() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Start, Some(&run_number_payload(9)));
        wait_for_state(&fsm, State::Run, Duration::from_secs(1));

        fsm.interrupt("sat.other reports state ERROR");
        wait_for_state(&fsm, State::Safe, Duration::from_secs(1));
        assert!(fsm.is_shutdown_allowed());
        // SAFE satellites can be re-initialized
        let (reply, _) = fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        assert_eq!(reply, CscpType::Success);
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
    }

    #[test]
    fn test_interrupt_outside_orbit_run_is_ignored() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        fsm.interrupt("nothing to do");
        assert_eq!(fsm.state(), State::New);

        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.interrupt("still nothing");
        assert_eq!(fsm.state(), State::Init);
    }

    #[test]
    fn test_shutdown_cancels_running_worker() {
        let fsm = Fsm::new(Box::new(Recorder::default()));
        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Start, Some(&run_number_payload(5)));
        wait_for_state(&fsm, State::Run, Duration::from_secs(1));

        let started = Instant::now();
        fsm.shutdown();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_command_during_transition_is_invalid() {
        // A worker that parks in `starting` long enough for the command
        // window to be observable.
        struct Slow;
        impl Satellite for Slow {
            fn type_name(&self) -> &str {
                "Slow"
            }
            fn satellite_name(&self) -> &str {
                "one"
            }
            fn starting(&mut self, token: &StopToken, _run: u32) -> Result<(), SatelliteError> {
                let started = Instant::now();
                while !token.stop_requested() && started.elapsed() < Duration::from_millis(500) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            }
        }

        let fsm = Fsm::new(Box::new(Slow));
        fsm.react_command(TransitionCommand::Initialize, Some(&empty_config_payload()));
        wait_for_state(&fsm, State::Init, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Launch, None);
        wait_for_state(&fsm, State::Orbit, Duration::from_secs(1));
        fsm.react_command(TransitionCommand::Start, Some(&run_number_payload(2)));
        wait_for_state(&fsm, State::Starting, Duration::from_secs(1));

        let (reply, _) = fsm.react_command(TransitionCommand::Stop, None);
        assert_eq!(reply, CscpType::Invalid);
        let (reply, _) = fsm.react_command(TransitionCommand::Launch, None);
        assert_eq!(reply, CscpType::Invalid);
    }
}
