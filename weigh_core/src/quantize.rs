//! Weight quantization pipeline: raw sample → calibrated, rounded, display-ready weight.
//!
//! ## Rounding convention
//!
//! Values are rounded to the nearest multiple of `DisplayCfg::step_kg` with
//! ties going **away from zero** (`0.025 kg → 0.05 kg`, `-0.075 kg → -0.10 kg`).
//! A quotient within `TIE_EPSILON` of a half step counts as a tie, so binary
//! representation noise (`3.425 / 0.05 = 68.49999…`) does not decide the
//! direction.

use crate::config::{DisplayCfg, NegativePolicy};
use crate::types::{DisplayWeight, RawReading, ScaleFactor};

/// Distance from an exact half step (in step units) still treated as a tie.
pub const TIE_EPSILON: f64 = 1e-9;

/// Steps 1–2: pre-quantization calibrated weight in kg.
#[inline]
pub fn calibrated_kg(reading: RawReading, factor: ScaleFactor) -> f64 {
    reading.kg_raw() * factor.get()
}

/// Round to the nearest integer, ties away from zero (with `TIE_EPSILON` tolerance).
#[inline]
pub fn round_half_away(x: f64) -> f64 {
    let whole = x.trunc();
    let frac = (x - whole).abs();
    if (frac - 0.5).abs() <= TIE_EPSILON {
        whole + x.signum()
    } else {
        x.round()
    }
}

/// Step 3: snap `kg` to the nearest multiple of `step_kg`.
/// Non-finite input maps to 0; negative zero is normalised to 0.
pub fn quantize(kg: f64, step_kg: f64) -> f64 {
    if !kg.is_finite() {
        return 0.0;
    }
    let q = round_half_away(kg / step_kg) * step_kg;
    if !q.is_finite() {
        // Too large to divide into steps; already coarser than a step.
        return kg;
    }
    if q == 0.0 { 0.0 } else { q }
}

/// Step 4: apply the negative display policy. Returns `(kg, negative_flag)`.
pub fn apply_policy(kg: f64, cfg: &DisplayCfg) -> (f64, bool) {
    match cfg.policy {
        NegativePolicy::Clamp => (kg.max(0.0), false),
        NegativePolicy::Preserve if kg < -cfg.negative_threshold_kg => (kg, true),
        NegativePolicy::Preserve if kg < 0.0 => (0.0, false),
        NegativePolicy::Preserve => (kg, false),
    }
}

/// Step 5: two decimals plus unit suffix.
pub fn format_weight(kg: f64, unit_suffix: &str) -> String {
    if unit_suffix.is_empty() {
        format!("{kg:.2}")
    } else {
        format!("{kg:.2} {unit_suffix}")
    }
}

/// Full pipeline.
pub fn compute(reading: RawReading, factor: ScaleFactor, cfg: &DisplayCfg) -> DisplayWeight {
    let kg = quantize(calibrated_kg(reading, factor), cfg.step_kg);
    let (kg, negative) = apply_policy(kg, cfg);
    DisplayWeight {
        kg,
        text: format_weight(kg, &cfg.unit_suffix),
        negative,
    }
}
