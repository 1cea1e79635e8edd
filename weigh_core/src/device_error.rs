//! Maps `Box<dyn Error>` from trait boundaries to typed `ScaleError`.
//!
//! The traits in `weigh_traits` use `Box<dyn Error + Send + Sync>` so any
//! device backend can plug in; this module converts those to our typed error
//! enum, with an optional feature-gated path for `weigh_device::DeviceError`
//! downcasting.

use crate::error::ScaleError;

/// Which device operation produced the error; decides the fallback mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOp {
    Launch,
    Send,
    Stop,
}

/// Map a trait-boundary error to a typed `ScaleError`.
///
/// Attempts to downcast known device error types first, then falls back to
/// the operation that failed.
pub fn map_device_error(
    e: &(dyn std::error::Error + Send + Sync + 'static),
    op: DeviceOp,
) -> ScaleError {
    #[cfg(feature = "device-errors")]
    {
        use weigh_device::error::DeviceError;
        if let Some(dev) = e.downcast_ref::<DeviceError>() {
            return match dev {
                DeviceError::Launch { .. } => ScaleError::Launch(dev.to_string()),
                DeviceError::Exited => ScaleError::Io(dev.to_string()),
                DeviceError::Io(_) if op == DeviceOp::Launch => ScaleError::Launch(dev.to_string()),
                DeviceError::Io(_) => ScaleError::Io(dev.to_string()),
                DeviceError::StopTimeout => ScaleError::Device(dev.to_string()),
            };
        }
    }

    let s = e.to_string();
    match op {
        DeviceOp::Launch => ScaleError::Launch(s),
        DeviceOp::Send => ScaleError::Io(s),
        DeviceOp::Stop => ScaleError::Device(s),
    }
}
