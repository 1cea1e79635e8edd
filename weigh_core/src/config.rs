//! Configuration types for the controller.
//!
//! These are the runtime configuration structs used by `Controller`.
//! They are separate from the TOML-deserialized config in `weigh_config`.

use std::time::Duration;

/// How negative quantized weights are displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NegativePolicy {
    /// `max(0, w)`: an empty platform never shows a negative value.
    #[default]
    Clamp,
    /// Values below `-negative_threshold_kg` are shown and flagged as negative;
    /// smaller negatives are shown as zero.
    Preserve,
}

/// Quantization and formatting of displayed weights.
#[derive(Debug, Clone)]
pub struct DisplayCfg {
    /// Quantization step in kg. Default: 0.05 kg.
    pub step_kg: f64,
    /// Jitter band below zero that still displays as zero. Default: 0.04 kg.
    pub negative_threshold_kg: f64,
    pub policy: NegativePolicy,
    /// Appended after the number, separated by a space. Default: "kg".
    pub unit_suffix: String,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            step_kg: 0.05,
            negative_threshold_kg: 0.04,
            policy: NegativePolicy::Clamp,
            unit_suffix: "kg".to_string(),
        }
    }
}

impl DisplayCfg {
    pub fn with_policy(mut self, policy: NegativePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerCfg {
    pub display: DisplayCfg,
    /// Byte sent to the device to request a tare.
    pub tare_byte: u8,
    /// Grace period between terminate and kill on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            display: DisplayCfg::default(),
            tare_byte: b't',
            shutdown_timeout: Duration::from_millis(1000),
        }
    }
}
