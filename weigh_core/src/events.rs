//! Events raised by the controller toward the presentation layer.

use crossbeam_channel as xch;

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleEvent {
    /// Zero-calibration advanced. `fraction` is in `[0.0, 1.0]`.
    CalibrationProgressChanged { step: u32, fraction: f64 },
    /// The calibration run completed; weights follow.
    CalibrationReady,
    /// A new calibration run was forced by a tare or a device reset.
    Recalibrating,
    WeightUpdated {
        kg: f64,
        text: String,
        negative: bool,
    },
    ScaleFactorChanged { factor: f64 },
    ErrorOccurred { message: String },
    /// The device session ended (device closed or controller shut down).
    MeasurementStopped,
}

/// Destination for controller events. Called on the controller's thread.
pub trait EventSink: Send {
    fn emit(&mut self, event: ScaleEvent);
}

impl EventSink for xch::Sender<ScaleEvent> {
    fn emit(&mut self, event: ScaleEvent) {
        // A dropped receiver means nobody is listening any more.
        if self.send(event).is_err() {
            tracing::trace!("event receiver gone; event dropped");
        }
    }
}

impl EventSink for Vec<ScaleEvent> {
    fn emit(&mut self, event: ScaleEvent) {
        self.push(event);
    }
}

/// Adapts a closure into an `EventSink`.
pub struct CallbackSink<F>(pub F);

impl<F> EventSink for CallbackSink<F>
where
    F: FnMut(ScaleEvent) + Send,
{
    fn emit(&mut self, event: ScaleEvent) {
        (self.0)(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn emit(&mut self, event: ScaleEvent) {
        (**self).emit(event)
    }
}
