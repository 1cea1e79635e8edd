//! Supervision of the external sampling program.
//!
//! The child is spawned with all three standard streams piped. One reader
//! thread per output stream forwards lines to the session sink as they
//! arrive; stdout end-of-stream is reported as `DeviceOutput::Closed`.
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, trace, warn};
use weigh_traits::{BoxError, Device, DeviceOutput, Launcher, MonotonicClock, OutputSink};

use crate::START_GATE;
use crate::error::{DeviceError, Result};
use crate::util::{decode_line, wait_until_with_timeout};

const STOP_POLL: Duration = Duration::from_millis(10);
/// Grace period used when a device is dropped without an explicit stop.
const DROP_TIMEOUT: Duration = Duration::from_millis(200);

/// What to execute for a measurement session.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Wrap the program in `stdbuf -oL` so its stdout is line buffered.
    pub line_buffered: bool,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            line_buffered: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn line_buffered(mut self, on: bool) -> Self {
        self.line_buffered = on;
        self
    }

    /// Executables that must be resolvable for a launch to succeed.
    pub fn required_programs(&self) -> Vec<&str> {
        if self.line_buffered {
            vec!["stdbuf", self.program.as_str()]
        } else {
            vec![self.program.as_str()]
        }
    }

    /// Program and arguments actually handed to the OS.
    pub fn command_line(&self) -> (String, Vec<String>) {
        if self.line_buffered {
            let mut args = vec!["-oL".to_string(), self.program.clone()];
            args.extend(self.args.iter().cloned());
            ("stdbuf".to_string(), args)
        } else {
            (self.program.clone(), self.args.clone())
        }
    }
}

/// Launches `ProcessDevice`s from a fixed `ProcessSpec`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    spec: ProcessSpec,
}

impl ProcessLauncher {
    pub fn new(spec: ProcessSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Spawn the program, start the output readers and pass the start gate.
    pub fn spawn(&self, sink: OutputSink) -> Result<ProcessDevice> {
        let (program, args) = self.spec.command_line();
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DeviceError::Launch {
                program: program.clone(),
                source,
            })?;
        info!(pid = child.id(), program = %program, "device launched");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdin = child.stdin.take();
        let mut device = ProcessDevice {
            child: Some(child),
            stdin,
            readers: Vec::with_capacity(2),
            program,
        };

        if let Some(out) = stdout {
            device
                .readers
                .push(spawn_reader("stdout", out, sink.clone(), true)?);
        }
        if let Some(err) = stderr {
            device.readers.push(spawn_reader("stderr", err, sink, false)?);
        }

        // A program that exits right away closes stdin first; its output
        // (and the Closed marker) still reach the sink.
        if let Err(e) = device.send_bytes(START_GATE) {
            warn!(error = %e, "start gate not delivered");
        }
        Ok(device)
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&mut self, sink: OutputSink) -> std::result::Result<Box<dyn Device>, BoxError> {
        Ok(Box::new(self.spawn(sink)?))
    }
}

/// A running child process and its pipes. Owned by exactly one session.
pub struct ProcessDevice {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    readers: Vec<JoinHandle<()>>,
    program: String,
}

impl std::fmt::Debug for ProcessDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessDevice")
            .field("program", &self.program)
            .field("pid", &self.id())
            .finish()
    }
}

impl ProcessDevice {
    /// OS process id while the child is owned.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut() {
            None => true,
            Some(child) => !matches!(child.try_wait(), Ok(None)),
        }
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.has_exited() {
            return Err(DeviceError::Exited);
        }
        let stdin = self.stdin.as_mut().ok_or(DeviceError::Exited)?;
        stdin.write_all(bytes)?;
        stdin.flush()?;
        trace!(len = bytes.len(), "control bytes written");
        Ok(())
    }

    /// Terminate the child: close stdin, SIGTERM, wait up to `timeout`, then kill.
    /// A second call finds no child and returns immediately.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        drop(self.stdin.take());

        if let Ok(Some(status)) = child.try_wait() {
            debug!(%status, "device already exited");
            self.release_readers();
            return Ok(());
        }

        request_terminate(&child);
        let clock = MonotonicClock::new();
        let waited = wait_until_with_timeout(
            || !matches!(child.try_wait(), Ok(None)),
            timeout,
            STOP_POLL,
            &clock,
        );
        match waited {
            Ok(()) => info!(program = %self.program, "device terminated"),
            Err(_) => {
                warn!(
                    program = %self.program,
                    timeout_ms = timeout.as_millis() as u64,
                    "device did not exit in time; killing"
                );
                if let Err(e) = child.kill() {
                    debug!(error = %e, "kill failed (already gone?)");
                }
                child.wait()?;
            }
        }
        self.release_readers();
        Ok(())
    }

    /// Join readers that already hit end-of-stream; detach the rest.
    /// A grandchild may still hold the pipe open, so never block here.
    fn release_readers(&mut self) {
        for handle in self.readers.drain(..) {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("device reader thread panicked");
                }
            } else {
                debug!("detaching device reader still blocked on its pipe");
            }
        }
    }
}

impl Device for ProcessDevice {
    fn send(&mut self, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        Ok(self.send_bytes(bytes)?)
    }

    fn is_running(&mut self) -> bool {
        !self.has_exited()
    }

    fn stop(&mut self, timeout: Duration) -> std::result::Result<(), BoxError> {
        Ok(self.shutdown(timeout)?)
    }
}

impl Drop for ProcessDevice {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(DROP_TIMEOUT) {
            warn!(error = %e, "device shutdown on drop failed");
        }
    }
}

#[cfg(unix)]
fn request_terminate(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_terminate(_child: &Child) {
    // No graceful signal available; the timeout path kills the child.
}

fn spawn_reader<R>(
    name: &'static str,
    stream: R,
    sink: OutputSink,
    report_close: bool,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("device-{name}"))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::with_capacity(128);
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => sink(DeviceOutput::Line(decode_line(&buf))),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(stream = name, error = %e, "device read failed");
                        sink(DeviceOutput::ReadError(e.to_string()));
                        break;
                    }
                }
            }
            if report_close {
                sink(DeviceOutput::Closed);
            }
            trace!(stream = name, "device reader exiting");
        })
}
