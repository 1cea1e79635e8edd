pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::sync::Arc;
use std::time::Duration;

/// Error type used at the trait boundary; implementations box their own typed errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One item produced by a device's output stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutput {
    /// A complete text line with trailing whitespace removed.
    Line(String),
    /// Reading the output stream failed; the stream may still be alive.
    ReadError(String),
    /// End of stream: the device closed its output (normally because it exited).
    Closed,
}

/// Where a device pushes its output. Called from the device's reader thread(s).
pub type OutputSink = Arc<dyn Fn(DeviceOutput) + Send + Sync + 'static>;

/// A running measurement device reachable through its control input.
pub trait Device: Send {
    /// Write control bytes to the device input and flush them.
    fn send(&mut self, bytes: &[u8]) -> Result<(), BoxError>;

    /// Whether the device is still alive and accepting commands.
    fn is_running(&mut self) -> bool;

    /// Ask the device to terminate, forcing it after `timeout`.
    /// Calling `stop` on an already stopped device is a no-op.
    fn stop(&mut self, timeout: Duration) -> Result<(), BoxError>;
}

/// Starts a device session whose output is delivered to `sink`.
pub trait Launcher: Send {
    fn launch(&mut self, sink: OutputSink) -> Result<Box<dyn Device>, BoxError>;
}
