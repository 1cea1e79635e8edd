//! Device line protocol.
//!
//! One event per line. Two families of dialects are accepted: the tagged
//! machine format (`CALIB:12`, `PESO:3456`, `RAW:797.2`) and the
//! human-readable console format (`Calibrazione in corso: 12/40`,
//! `Peso: 3456 g`). Matching is by substring, so prefixes such as
//! timestamps are tolerated. Anything else is `Unrecognized`.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::RawReading;

/// A classified device line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceLine {
    /// Zero-calibration sample `n` of the current run.
    CalibrationStep(u32),
    WeightSample(RawReading),
    /// The device acknowledged a tare and restarted its zero calibration.
    ResetStarted,
    Unrecognized,
}

macro_rules! pattern {
    ($name:ident, $re:literal) => {
        #[allow(clippy::expect_used)]
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("literal pattern compiles"));
    };
}

pattern!(CALIB_TAG, r"CALIB:\s*([^:\s]*)");
pattern!(CALIB_HUMAN, r"Calibrazione\D*?(\d+)\s*/\s*\d+");
pattern!(PESO_TAG, r"PESO:\s*([^:\s]*)");
pattern!(RAW_TAG, r"RAW:\s*([^:\s]*)");
pattern!(
    PESO_HUMAN,
    r"Peso:\s*([-+]?\d+(?:[.,]\d+)?)\s*([A-Za-z]*)"
);

const RESET_TAG: &str = "RESET_START";

/// Classify one line. Never fails: malformed payloads are `Unrecognized`.
pub fn parse(line: &str) -> DeviceLine {
    if let Some(c) = CALIB_TAG.captures(line) {
        return c[1]
            .parse::<u32>()
            .map_or(DeviceLine::Unrecognized, DeviceLine::CalibrationStep);
    }
    if let Some(c) = CALIB_HUMAN.captures(line) {
        return c[1]
            .parse::<u32>()
            .map_or(DeviceLine::Unrecognized, DeviceLine::CalibrationStep);
    }
    if let Some(c) = PESO_TAG.captures(line) {
        return parse_number(&c[1]).map_or(DeviceLine::Unrecognized, |v| {
            DeviceLine::WeightSample(RawReading::grams(v))
        });
    }
    if let Some(c) = RAW_TAG.captures(line) {
        return parse_number(&c[1]).map_or(DeviceLine::Unrecognized, |v| {
            DeviceLine::WeightSample(RawReading::raw_units(v))
        });
    }
    if let Some(c) = PESO_HUMAN.captures(line) {
        let Some(value) = parse_number(&c[1]) else {
            return DeviceLine::Unrecognized;
        };
        return match grams_multiplier(&c[2]) {
            Some(m) if (value * m).is_finite() => {
                DeviceLine::WeightSample(RawReading::grams(value * m))
            }
            Some(_) => DeviceLine::Unrecognized,
            None => DeviceLine::Unrecognized,
        };
    }
    if line.contains(RESET_TAG) {
        return DeviceLine::ResetStarted;
    }
    DeviceLine::Unrecognized
}

/// Finite decimal number; a decimal comma is accepted.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let v: f64 = s.replace(',', ".").parse().ok()?;
    v.is_finite().then_some(v)
}

/// Factor converting a human-dialect unit suffix to grams.
fn grams_multiplier(suffix: &str) -> Option<f64> {
    match suffix.to_ascii_lowercase().as_str() {
        "" | "g" | "gr" | "grammi" => Some(1.0),
        "kg" => Some(1000.0),
        _ => None,
    }
}
