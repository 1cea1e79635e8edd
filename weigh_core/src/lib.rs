#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Weight acquisition and calibration logic (device-agnostic).
//!
//! The device is reached only through `weigh_traits::Launcher` and
//! `weigh_traits::Device`; everything here works on its text output.
//!
//! ## Architecture
//!
//! - **Protocol**: one parser for every line dialect the sampling programs print (`protocol`)
//! - **Calibration**: zero-calibration progress state machine (`calibration`)
//! - **Quantization**: raw reading → calibrated, rounded, formatted weight (`quantize`)
//! - **Store**: persisted scale factor (`store`)
//! - **Controller**: owned facade applying device output and front-end commands (`controller`)
//! - **Runner**: session loop interleaving device output with commands (`runner`)
//!
//! Events flow out through the `EventSink` trait; nothing in this crate
//! knows about a terminal or a GUI.

pub mod calibration;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod device_error;
pub mod error;
pub mod events;
pub mod mocks;
pub mod protocol;
pub mod quantize;
pub mod runner;
pub mod store;
pub mod types;

pub use calibration::{CalibrationState, CalibrationTracker, Progress, TOTAL_STEPS};
pub use config::{ControllerCfg, DisplayCfg, NegativePolicy};
pub use controller::{Controller, ControllerBuilder, Missing, Set};
pub use error::{BuildError, Report, Result, ScaleError};
pub use events::{CallbackSink, EventSink, ScaleEvent};
pub use protocol::DeviceLine;
pub use runner::{Command, RunOutcome};
pub use store::CalibrationStore;
pub use types::{DisplayWeight, RawReading, ScaleFactor, Unit};
