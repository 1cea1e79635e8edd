//! Drives one measurement session on the calling thread.
//!
//! Front-ends feed `Command`s over a channel (from a console reader, a
//! keypad, a socket) while the runner interleaves them with device output.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use tracing::{debug, info, warn};

use crate::controller::Controller;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tare,
    /// Reference weight as typed by the operator; parsed by the controller.
    Calibrate(String),
    Quit,
}

impl Command {
    /// Console syntax: `t`, `c <kg>`, `q`. Blank or unknown input yields `None`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((h, r)) => (h, r.trim()),
            None => (input, ""),
        };
        match head.to_ascii_lowercase().as_str() {
            "t" | "tare" => Some(Self::Tare),
            "c" | "cal" | "calibrate" => Some(Self::Calibrate(rest.to_string())),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    DeviceClosed,
    Quit,
    Interrupted,
}

/// Start measuring and process device output and commands until the device
/// closes, `Quit` arrives, the command channel disconnects, or `stop` is raised.
/// The session is shut down before returning.
///
/// Rejected commands are reported as `ErrorOccurred` and do not end the run.
pub fn run(
    controller: &mut Controller,
    commands: &xch::Receiver<Command>,
    stop: &AtomicBool,
    poll_interval: Duration,
) -> Result<RunOutcome> {
    controller.start_measurement()?;
    let mut commands_open = true;

    let outcome = loop {
        if stop.load(Ordering::Relaxed) {
            info!("interrupted");
            break RunOutcome::Interrupted;
        }

        if commands_open {
            match commands.try_recv() {
                Ok(Command::Quit) => break RunOutcome::Quit,
                Ok(cmd) => execute(controller, cmd),
                Err(xch::TryRecvError::Empty) => {}
                Err(xch::TryRecvError::Disconnected) => {
                    // Input ended (e.g. stdin at EOF); keep measuring until the device closes.
                    debug!("command channel closed");
                    commands_open = false;
                }
            }
        }

        controller.poll_timeout(poll_interval);
        if !controller.has_session() {
            break RunOutcome::DeviceClosed;
        }
    };

    if let Err(e) = controller.shutdown() {
        warn!(error = %e, "shutdown reported an error");
    }
    Ok(outcome)
}

fn execute(controller: &mut Controller, cmd: Command) {
    let result = match &cmd {
        Command::Tare => controller.tare(),
        Command::Calibrate(text) => controller.calibrate_with_input(text).map(|_| ()),
        Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        warn!(command = ?cmd, error = %e, "command rejected");
        // Device errors were already reported by the controller.
        if matches!(cmd, Command::Calibrate(_)) {
            controller.report_error(e.to_string());
        }
    }
}
