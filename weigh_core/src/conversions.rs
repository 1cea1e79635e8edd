//! `From` implementations bridging `weigh_config` types to `weigh_core` types.

use std::time::Duration;

use crate::config::{ControllerCfg, DisplayCfg, NegativePolicy};
use crate::store::CalibrationStore;
use crate::types::ScaleFactor;

// ── NegativePolicy ───────────────────────────────────────────────────────────

impl From<weigh_config::NegativePolicy> for NegativePolicy {
    fn from(p: weigh_config::NegativePolicy) -> Self {
        match p {
            weigh_config::NegativePolicy::Clamp => Self::Clamp,
            weigh_config::NegativePolicy::Preserve => Self::Preserve,
        }
    }
}

// ── DisplayCfg ───────────────────────────────────────────────────────────────

impl From<&weigh_config::DisplayCfg> for DisplayCfg {
    fn from(c: &weigh_config::DisplayCfg) -> Self {
        Self {
            step_kg: c.step_kg,
            negative_threshold_kg: c.negative_threshold_kg,
            policy: c.negative_policy.into(),
            unit_suffix: c.unit_suffix.clone(),
        }
    }
}

// ── ControllerCfg ────────────────────────────────────────────────────────────

impl From<&weigh_config::Config> for ControllerCfg {
    fn from(c: &weigh_config::Config) -> Self {
        let defaults = Self::default();
        Self {
            display: (&c.display).into(),
            tare_byte: c.device.tare_byte().unwrap_or(defaults.tare_byte),
            shutdown_timeout: Duration::from_millis(c.shutdown.timeout_ms),
        }
    }
}

// ── CalibrationStore ─────────────────────────────────────────────────────────

impl From<&weigh_config::CalibrationCfg> for CalibrationStore {
    fn from(c: &weigh_config::CalibrationCfg) -> Self {
        Self::new(
            &c.file,
            ScaleFactor::new(c.default_factor).unwrap_or_default(),
        )
    }
}
