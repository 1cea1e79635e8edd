//! Value types shared by the parser, the quantizer and the controller.

/// Native unit of a weight sample as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Grams; divided by 1000 before the scale factor is applied.
    Grams,
    /// Uncalibrated sensor counts; the scale factor maps them to kg directly.
    RawUnits,
}

/// A single sample in the device's native unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub value: f64,
    pub unit: Unit,
}

impl RawReading {
    pub fn grams(value: f64) -> Self {
        Self {
            value,
            unit: Unit::Grams,
        }
    }

    pub fn raw_units(value: f64) -> Self {
        Self {
            value,
            unit: Unit::RawUnits,
        }
    }

    /// Value in the pre-factor kilogram domain (`kg_raw`).
    #[inline]
    pub fn kg_raw(&self) -> f64 {
        match self.unit {
            Unit::Grams => self.value / 1000.0,
            Unit::RawUnits => self.value,
        }
    }
}

/// Multiplier from `kg_raw` to calibrated kilograms. Always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub const DEFAULT: Self = Self(1.0);

    /// Returns `None` for zero, negative or non-finite values.
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Shortest representation that parses back to the same f64.
        write!(f, "{}", self.0)
    }
}

/// Quantized weight ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayWeight {
    /// Displayed value in kg after quantization and sign policy.
    pub kg: f64,
    pub text: String,
    /// True for a real negative (tare drift) that deserves distinct styling.
    pub negative: bool,
}
