//! Device side of the scale: supervision of the external sampling program
//! and an in-process simulated device with the same control protocol.

pub mod error;
pub mod process;
pub mod sim;
pub mod util;

pub use process::{ProcessDevice, ProcessLauncher, ProcessSpec};
pub use sim::{SimBehavior, SimProbe, SimulatedLauncher};

/// Written once right after launch; the sampling program waits for a
/// keypress-equivalent before it starts streaming.
pub const START_GATE: &[u8] = b"\n";
