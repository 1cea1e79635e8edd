//! In-process simulated device.
//!
//! Speaks the same control protocol as the real sampling program: nothing
//! is emitted before the start gate, `t` restarts the zero calibration with
//! `RESET_START`, any other key ends the program. Every byte written to the
//! device is recorded and can be inspected through a `SimProbe`.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace};
use weigh_traits::{BoxError, Clock, Device, DeviceOutput, Launcher, MonotonicClock, OutputSink};

use crate::START_GATE;
use crate::error::DeviceError;

/// Number of zero samples the simulated load cell averages after start or tare.
pub const SIM_CALIBRATION_STEPS: u32 = 40;

const IDLE_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub enum SimBehavior {
    /// Emit `lines` once after the start gate. Unless `hold_open`, the
    /// output stream closes right after the last line.
    Script { lines: Vec<String>, hold_open: bool },
    /// Calibration run of `SIM_CALIBRATION_STEPS`, then `PESO:<grams>` every `period`.
    LoadCell { grams: f64, period: Duration },
}

#[derive(Debug, Default)]
struct SimShared {
    sent: Mutex<Vec<u8>>,
    launches: AtomicUsize,
    stops: AtomicUsize,
}

#[derive(Debug, Default)]
struct SessionState {
    inbox: Mutex<VecDeque<u8>>,
    stop: AtomicBool,
    finished: AtomicBool,
}

impl SessionState {
    fn take_inbox(&self) -> Vec<u8> {
        self.inbox
            .lock()
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }
}

/// Launcher for simulated sessions.
#[derive(Debug, Clone)]
pub struct SimulatedLauncher {
    behavior: SimBehavior,
    fail_launch: bool,
    shared: Arc<SimShared>,
}

impl SimulatedLauncher {
    pub fn new(behavior: SimBehavior) -> Self {
        Self {
            behavior,
            fail_launch: false,
            shared: Arc::default(),
        }
    }

    /// Replay `lines`, then close the stream.
    pub fn scripted<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(SimBehavior::Script {
            lines: lines.into_iter().map(Into::into).collect(),
            hold_open: false,
        })
    }

    /// Replay `lines`, then stay alive until stopped.
    pub fn scripted_open<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(SimBehavior::Script {
            lines: lines.into_iter().map(Into::into).collect(),
            hold_open: true,
        })
    }

    pub fn load_cell(grams: f64, period: Duration) -> Self {
        Self::new(SimBehavior::LoadCell { grams, period })
    }

    /// A launcher whose program can never be started.
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::scripted(Vec::<String>::new())
        }
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe {
            shared: self.shared.clone(),
        }
    }
}

impl Launcher for SimulatedLauncher {
    fn launch(&mut self, sink: OutputSink) -> Result<Box<dyn Device>, BoxError> {
        if self.fail_launch {
            return Err(Box::new(DeviceError::Launch {
                program: "simulated".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            }));
        }
        self.shared.launches.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(SessionState::default());
        let behavior = self.behavior.clone();
        let thread_session = session.clone();
        let worker = std::thread::Builder::new()
            .name("device-sim".to_string())
            .spawn(move || {
                run_session(&behavior, &thread_session, &sink, &MonotonicClock::new());
                thread_session.finished.store(true, Ordering::Release);
            })?;

        let mut device = SimulatedDevice {
            session,
            shared: self.shared.clone(),
            worker: Some(worker),
        };
        device.send(START_GATE)?;
        Ok(Box::new(device))
    }
}

/// Read-only view of what the simulated device saw.
#[derive(Debug, Clone)]
pub struct SimProbe {
    shared: Arc<SimShared>,
}

impl SimProbe {
    /// All bytes written to the device across sessions, in order.
    pub fn sent(&self) -> Vec<u8> {
        self.shared.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self, byte: u8) -> usize {
        self.sent().iter().filter(|b| **b == byte).count()
    }

    pub fn launches(&self) -> usize {
        self.shared.launches.load(Ordering::Relaxed)
    }

    /// Number of times a live session was terminated.
    pub fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::Relaxed)
    }
}

struct SimulatedDevice {
    session: Arc<SessionState>,
    shared: Arc<SimShared>,
    worker: Option<JoinHandle<()>>,
}

impl Device for SimulatedDevice {
    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        if !self.is_running() {
            return Err(Box::new(DeviceError::Exited));
        }
        if let Ok(mut sent) = self.shared.sent.lock() {
            sent.extend_from_slice(bytes);
        }
        if let Ok(mut inbox) = self.session.inbox.lock() {
            inbox.extend(bytes.iter().copied());
        }
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.worker.is_some() && !self.session.finished.load(Ordering::Acquire)
    }

    fn stop(&mut self, _timeout: Duration) -> Result<(), BoxError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.session.stop.store(true, Ordering::Release);
        self.shared.stops.fetch_add(1, Ordering::Relaxed);
        if worker.join().is_err() {
            debug!("simulated device thread panicked");
        }
        Ok(())
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        let _ = self.stop(Duration::ZERO);
    }
}

fn run_session(
    behavior: &SimBehavior,
    session: &SessionState,
    sink: &OutputSink,
    clock: &impl Clock,
) {
    if wait_for_gate(session, clock) {
        match behavior {
            SimBehavior::Script { lines, hold_open } => {
                for line in lines {
                    sink(DeviceOutput::Line(line.clone()));
                }
                if *hold_open {
                    while !session.stop.load(Ordering::Acquire) {
                        clock.sleep(IDLE_POLL);
                    }
                }
            }
            SimBehavior::LoadCell { grams, period } => {
                run_load_cell(*grams, *period, session, sink, clock);
            }
        }
    }
    sink(DeviceOutput::Closed);
    trace!("simulated session finished");
}

/// Block until the start gate arrives. Returns false if stopped first.
fn wait_for_gate(session: &SessionState, clock: &impl Clock) -> bool {
    loop {
        if session.stop.load(Ordering::Acquire) {
            return false;
        }
        let pending = session.take_inbox();
        if pending.contains(&b'\n') {
            return true;
        }
        clock.sleep(IDLE_POLL);
    }
}

fn run_load_cell(
    grams: f64,
    period: Duration,
    session: &SessionState,
    sink: &OutputSink,
    clock: &impl Clock,
) {
    let mut samples = 0u32;
    loop {
        for key in session.take_inbox() {
            match key {
                b't' => {
                    samples = 0;
                    sink(DeviceOutput::Line("RESET_START".to_string()));
                }
                b'\n' | b'\r' => {}
                _ => {
                    sink(DeviceOutput::Line("Fine programma.".to_string()));
                    return;
                }
            }
        }
        if samples < SIM_CALIBRATION_STEPS {
            samples += 1;
            sink(DeviceOutput::Line(format!("CALIB:{samples}")));
        } else {
            sink(DeviceOutput::Line(format!("PESO:{}", grams.round() as i64)));
        }

        // Sleep in small slices so stop requests are honoured promptly.
        let epoch = clock.now();
        while clock.elapsed(epoch) < period {
            if session.stop.load(Ordering::Acquire) {
                return;
            }
            clock.sleep(IDLE_POLL.min(period));
        }
        if session.stop.load(Ordering::Acquire) {
            return;
        }
    }
}
