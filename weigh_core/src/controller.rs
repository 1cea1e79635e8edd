//! The single owned facade between a front-end and the weighing device.
//!
//! Device output arrives on reader threads and is queued in a channel; the
//! controller applies it on the caller's thread in `poll`. All state
//! (factor, last reading, calibration progress) is owned here, so nothing
//! is shared or locked.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as xch;
use tracing::{debug, info, trace, warn};
use weigh_traits::{Device, DeviceOutput, Launcher, OutputSink};

use crate::calibration::{CalibrationState, CalibrationTracker, Progress};
use crate::config::ControllerCfg;
use crate::device_error::{DeviceOp, map_device_error};
use crate::error::{BuildError, Result, ScaleError};
use crate::events::{EventSink, ScaleEvent};
use crate::protocol::{self, DeviceLine};
use crate::quantize;
use crate::store::CalibrationStore;
use crate::types::{RawReading, ScaleFactor};

struct Session {
    device: Box<dyn Device>,
    rx: xch::Receiver<DeviceOutput>,
}

pub struct Controller {
    launcher: Box<dyn Launcher>,
    sink: Box<dyn EventSink>,
    store: CalibrationStore,
    cfg: ControllerCfg,
    factor: ScaleFactor,
    /// Last reading in the pre-factor kg domain.
    last_raw: Option<f64>,
    calibration: CalibrationTracker,
    session: Option<Session>,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("factor", &self.factor)
            .field("last_raw", &self.last_raw)
            .field("calibration", &self.calibration.state())
            .field("session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn builder() -> ControllerBuilder<Missing, Missing, Missing> {
        ControllerBuilder::default()
    }

    pub fn scale_factor(&self) -> ScaleFactor {
        self.factor
    }

    pub fn last_raw(&self) -> Option<f64> {
        self.last_raw
    }

    pub fn calibration(&self) -> CalibrationState {
        self.calibration.state()
    }

    pub fn config(&self) -> &ControllerCfg {
        &self.cfg
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether a session exists and its device is still alive.
    pub fn is_running(&mut self) -> bool {
        self.session
            .as_mut()
            .is_some_and(|s| s.device.is_running())
    }

    /// Launch the device unless a live session already exists.
    pub fn start_measurement(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("start_measurement: session already running");
            return Ok(());
        }
        // Output a dead session left behind is applied before it is replaced.
        if self.session.is_some() {
            self.poll();
            self.end_session("device exited before restart");
        }

        let (tx, rx) = xch::unbounded();
        let output: OutputSink = Arc::new(move |item| {
            let _ = tx.send(item);
        });
        let device = match self.launcher.launch(output) {
            Ok(d) => d,
            Err(e) => {
                let err = map_device_error(&*e, DeviceOp::Launch);
                warn!(error = %err, "device launch failed");
                self.emit(ScaleEvent::ErrorOccurred {
                    message: err.to_string(),
                });
                return Err(eyre::Report::new(err));
            }
        };
        self.calibration.reset();
        self.session = Some(Session { device, rx });
        info!(factor = self.factor.get(), "measurement started");
        Ok(())
    }

    /// Zero the scale: send the tare command and restart the calibration run.
    /// Without a live session this does nothing.
    pub fn tare(&mut self) -> Result<()> {
        let byte = self.cfg.tare_byte;
        let Some(session) = self.session.as_mut() else {
            debug!("tare ignored: no session");
            return Ok(());
        };
        if !session.device.is_running() {
            debug!("tare ignored: device not running");
            return Ok(());
        }
        if let Err(e) = session.device.send(&[byte]) {
            let err = map_device_error(&*e, DeviceOp::Send);
            warn!(error = %err, "tare command not delivered");
            self.emit(ScaleEvent::ErrorOccurred {
                message: err.to_string(),
            });
            return Err(eyre::Report::new(err));
        }
        info!("tare requested");
        self.restart_calibration();
        Ok(())
    }

    /// Derive a new scale factor from a reference weight currently on the
    /// platform. The factor is changed only when every check passes.
    pub fn calibrate_with_sample(&mut self, known_kg: f64) -> Result<ScaleFactor> {
        let raw = self
            .last_raw
            .filter(|r| *r != 0.0)
            .ok_or_else(|| eyre::Report::new(ScaleError::NoReading))?;
        if !(known_kg.is_finite() && known_kg > 0.0) {
            return Err(eyre::Report::new(ScaleError::InvalidSample(
                known_kg.to_string(),
            )));
        }
        let candidate = known_kg / raw;
        let factor = ScaleFactor::new(candidate)
            .ok_or_else(|| eyre::Report::new(ScaleError::InvalidFactor(candidate)))?;

        info!(
            known_kg,
            last_raw = raw,
            old = self.factor.get(),
            new = factor.get(),
            "scale factor calibrated"
        );
        self.factor = factor;
        self.store.save(factor);
        self.emit(ScaleEvent::ScaleFactorChanged {
            factor: factor.get(),
        });
        Ok(factor)
    }

    /// Like `calibrate_with_sample`, taking the reference weight as typed text.
    pub fn calibrate_with_input(&mut self, text: &str) -> Result<ScaleFactor> {
        if self.last_raw.filter(|r| *r != 0.0).is_none() {
            return Err(eyre::Report::new(ScaleError::NoReading));
        }
        let known_kg = protocol::parse_number(text.trim())
            .ok_or_else(|| eyre::Report::new(ScaleError::InvalidSample(text.trim().to_string())))?;
        self.calibrate_with_sample(known_kg)
    }

    /// Apply all device output received so far. Returns the number of items handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(item) = self.session.as_ref().and_then(|s| s.rx.try_recv().ok()) {
            self.handle_output(item);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for device output, then apply everything pending.
    /// Without a session this just sleeps for `timeout`.
    pub fn poll_timeout(&mut self, timeout: Duration) -> usize {
        let first = match self.session.as_ref() {
            Some(s) => s.rx.recv_timeout(timeout).ok(),
            None => {
                std::thread::sleep(timeout);
                return 0;
            }
        };
        match first {
            Some(item) => {
                self.handle_output(item);
                1 + self.poll()
            }
            None => 0,
        }
    }

    /// Apply one item from the device output stream.
    pub fn handle_output(&mut self, item: DeviceOutput) {
        match item {
            DeviceOutput::Line(line) => self.handle_line(&line),
            DeviceOutput::ReadError(message) => {
                warn!(error = %message, "device output read error");
                self.emit(ScaleEvent::ErrorOccurred { message });
            }
            DeviceOutput::Closed => self.end_session("device closed its output"),
        }
    }

    /// Apply one device line.
    pub fn handle_line(&mut self, line: &str) {
        match protocol::parse(line) {
            DeviceLine::CalibrationStep(step) => {
                let outcome = self.calibration.on_step(step);
                if outcome.restarted {
                    debug!(step, "calibration run started");
                }
                self.emit_progress(outcome.progress);
                if outcome.became_ready {
                    info!("calibration ready");
                    self.emit(ScaleEvent::CalibrationReady);
                }
            }
            DeviceLine::WeightSample(reading) => self.apply_reading(reading),
            DeviceLine::ResetStarted => {
                // The device echoes a tare we already accounted for.
                if self.calibration.state() != CalibrationState::InProgress(0) {
                    info!("device restarted calibration");
                    self.restart_calibration();
                }
            }
            DeviceLine::Unrecognized => trace!(line, "ignored device line"),
        }
    }

    /// Stop the device and end the session. Safe to call at any time, any number of times.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        let stopped = session.device.stop(self.cfg.shutdown_timeout);
        self.emit(ScaleEvent::MeasurementStopped);
        match stopped {
            Ok(()) => {
                info!("measurement stopped");
                Ok(())
            }
            Err(e) => {
                let err = map_device_error(&*e, DeviceOp::Stop);
                warn!(error = %err, "device stop failed");
                Err(eyre::Report::new(err))
            }
        }
    }

    /// Surface a front-end error (for example a rejected calibration input)
    /// through the event sink.
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.emit(ScaleEvent::ErrorOccurred {
            message: message.into(),
        });
    }

    fn apply_reading(&mut self, reading: RawReading) {
        self.last_raw = Some(reading.kg_raw());
        let weight = quantize::compute(reading, self.factor, &self.cfg.display);
        debug!(raw = reading.value, kg = weight.kg, "weight");
        self.emit(ScaleEvent::WeightUpdated {
            kg: weight.kg,
            text: weight.text,
            negative: weight.negative,
        });
    }

    fn restart_calibration(&mut self) {
        let progress = self.calibration.restart();
        self.emit(ScaleEvent::Recalibrating);
        self.emit_progress(progress);
    }

    fn end_session(&mut self, reason: &str) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.device.stop(self.cfg.shutdown_timeout) {
                let err = map_device_error(&*e, DeviceOp::Stop);
                warn!(error = %err, "stop after close failed");
            }
            info!(reason, "measurement stopped");
            self.emit(ScaleEvent::MeasurementStopped);
        }
    }

    fn emit_progress(&mut self, p: Progress) {
        self.emit(ScaleEvent::CalibrationProgressChanged {
            step: p.step,
            fraction: p.fraction,
        });
    }

    fn emit(&mut self, event: ScaleEvent) {
        self.sink.emit(event);
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.device.stop(self.cfg.shutdown_timeout);
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Controller`. Launcher, sink and store must be provided;
/// `build()` only exists once all three are set, `try_build()` in any state.
pub struct ControllerBuilder<L, K, P> {
    launcher: Option<Box<dyn Launcher>>,
    sink: Option<Box<dyn EventSink>>,
    store: Option<CalibrationStore>,
    cfg: Option<ControllerCfg>,
    factor: Option<ScaleFactor>,
    _l: PhantomData<L>,
    _k: PhantomData<K>,
    _p: PhantomData<P>,
}

impl Default for ControllerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            launcher: None,
            sink: None,
            store: None,
            cfg: None,
            factor: None,
            _l: PhantomData,
            _k: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<L, K, P> ControllerBuilder<L, K, P> {
    fn retag<L2, K2, P2>(self) -> ControllerBuilder<L2, K2, P2> {
        ControllerBuilder {
            launcher: self.launcher,
            sink: self.sink,
            store: self.store,
            cfg: self.cfg,
            factor: self.factor,
            _l: PhantomData,
            _k: PhantomData,
            _p: PhantomData,
        }
    }

    pub fn with_config(mut self, cfg: ControllerCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Start with this factor instead of the one loaded from the store.
    pub fn with_scale_factor(mut self, factor: ScaleFactor) -> Self {
        self.factor = Some(factor);
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Controller> {
        let launcher = self
            .launcher
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLauncher))?;
        let sink = self
            .sink
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSink))?;
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let cfg = self.cfg.unwrap_or_default();

        let step = cfg.display.step_kg;
        if !(step.is_finite() && step > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "step_kg must be a positive finite number",
            )));
        }
        let threshold = cfg.display.negative_threshold_kg;
        if !(threshold.is_finite() && (0.0..step).contains(&threshold)) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "negative_threshold_kg must be in [0, step_kg)",
            )));
        }
        if cfg.tare_byte == b'\n' {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "tare command must not be a newline",
            )));
        }
        if cfg.shutdown_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "shutdown timeout must be > 0",
            )));
        }

        let factor = self.factor.unwrap_or_else(|| store.load());
        Ok(Controller {
            launcher,
            sink,
            store,
            cfg,
            factor,
            last_raw: None,
            calibration: CalibrationTracker::new(),
            session: None,
        })
    }
}

impl<K, P> ControllerBuilder<Missing, K, P> {
    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> ControllerBuilder<Set, K, P> {
        self.launcher = Some(Box::new(launcher));
        self.retag()
    }
}

impl<L, P> ControllerBuilder<L, Missing, P> {
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> ControllerBuilder<L, Set, P> {
        self.sink = Some(Box::new(sink));
        self.retag()
    }
}

impl<L, K> ControllerBuilder<L, K, Missing> {
    pub fn with_store(mut self, store: CalibrationStore) -> ControllerBuilder<L, K, Set> {
        self.store = Some(store);
        self.retag()
    }
}

impl ControllerBuilder<Set, Set, Set> {
    /// Validate and build. Only available when launcher, sink and store are set.
    pub fn build(self) -> Result<Controller> {
        self.try_build()
    }
}
