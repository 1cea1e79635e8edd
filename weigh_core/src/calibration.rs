//! Zero-calibration progress as reported by the device.
//!
//! After start and after every tare the device averages `TOTAL_STEPS`
//! samples to find its zero and reports each one. The tracker mirrors that
//! run: `Idle → InProgress(step) → Ready`. It holds no timers; every
//! transition comes from a device line or a controller command.

/// Samples in one calibration run.
pub const TOTAL_STEPS: u32 = 40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CalibrationState {
    #[default]
    Idle,
    InProgress(u32),
    Ready,
}

/// Progress of the current run for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub step: u32,
    /// `step / TOTAL_STEPS`, in `[0.0, 1.0]`.
    pub fraction: f64,
}

impl Progress {
    pub fn of(step: u32) -> Self {
        let step = step.min(TOTAL_STEPS);
        Self {
            step,
            fraction: f64::from(step) / f64::from(TOTAL_STEPS),
        }
    }
}

/// Result of feeding one calibration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub progress: Progress,
    /// The step started a new run (first step, or lower than the current one).
    pub restarted: bool,
    /// This step completed the run. Reported once per run.
    pub became_ready: bool,
}

#[derive(Debug, Default, Clone)]
pub struct CalibrationTracker {
    state: CalibrationState,
}

impl CalibrationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == CalibrationState::Ready
    }

    pub fn progress(&self) -> Progress {
        match self.state {
            CalibrationState::Idle => Progress::of(0),
            CalibrationState::InProgress(step) => Progress::of(step),
            CalibrationState::Ready => Progress::of(TOTAL_STEPS),
        }
    }

    /// Apply a `CalibrationStep` from the device. Steps above `TOTAL_STEPS` are clamped.
    pub fn on_step(&mut self, step: u32) -> StepOutcome {
        let step = step.min(TOTAL_STEPS);
        let restarted = match self.state {
            CalibrationState::Idle => true,
            CalibrationState::InProgress(current) => step < current,
            CalibrationState::Ready => step < TOTAL_STEPS,
        };
        let was_ready = self.is_ready();
        self.state = if step >= TOTAL_STEPS {
            CalibrationState::Ready
        } else {
            CalibrationState::InProgress(step)
        };
        StepOutcome {
            progress: Progress::of(step),
            restarted,
            became_ready: self.is_ready() && !was_ready,
        }
    }

    /// Discard progress and wait for a fresh run (tare, device reset).
    pub fn restart(&mut self) -> Progress {
        self.state = CalibrationState::InProgress(0);
        Progress::of(0)
    }

    /// Back to `Idle` for a new session.
    pub fn reset(&mut self) {
        self.state = CalibrationState::Idle;
    }
}
