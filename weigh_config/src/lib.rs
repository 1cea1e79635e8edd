#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the scale controller.
//!
//! - `Config` and its tables are deserialized from TOML; every table is optional
//!   and falls back to the defaults of the reference load-cell setup.
//! - `Config::validate` rejects values the controller cannot work with.
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeviceCfg {
    /// Sampling program to supervise
    pub program: String,
    pub args: Vec<String>,
    /// Run the program under `stdbuf -oL` so measurements are not block-buffered
    pub line_buffered: bool,
    /// Control character that asks the device to re-zero
    pub tare_command: String,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            program: "./leggi_peso".to_string(),
            args: Vec::new(),
            line_buffered: true,
            tare_command: "t".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NegativePolicy {
    /// Never show negative weights: max(0, w)
    #[default]
    Clamp,
    /// Show real negatives (tare drift) flagged; suppress only small jitter
    Preserve,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DisplayCfg {
    /// Quantization step in kg
    pub step_kg: f64,
    /// Negatives down to -threshold are displayed as zero (preserve policy)
    pub negative_threshold_kg: f64,
    pub negative_policy: NegativePolicy,
    pub unit_suffix: String,
}

impl Default for DisplayCfg {
    fn default() -> Self {
        Self {
            step_kg: 0.05,
            negative_threshold_kg: 0.04,
            negative_policy: NegativePolicy::Clamp,
            unit_suffix: "kg".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Plain-text file holding the persisted scale factor
    pub file: String,
    /// Used when the file is missing or holds an invalid factor
    pub default_factor: f64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            file: "scale_factor.txt".to_string(),
            default_factor: 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShutdownCfg {
    /// Grace period between terminate and kill
    pub timeout_ms: u64,
}

impl Default for ShutdownCfg {
    fn default() -> Self {
        Self { timeout_ms: 1000 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceCfg,
    pub display: DisplayCfg,
    pub calibration: CalibrationCfg,
    pub shutdown: ShutdownCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl DeviceCfg {
    /// The tare command as the single byte sent to the device.
    pub fn tare_byte(&self) -> Option<u8> {
        match self.tare_command.as_bytes() {
            [b] if b.is_ascii() && *b != b'\n' && *b != b'\r' => Some(*b),
            _ => None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if self.device.program.trim().is_empty() {
            eyre::bail!("device.program must not be empty");
        }
        if self.device.tare_byte().is_none() {
            eyre::bail!("device.tare_command must be a single ASCII character other than newline");
        }

        // Display
        let step = self.display.step_kg;
        if !(step.is_finite() && step > 0.0) {
            eyre::bail!("display.step_kg must be a finite number > 0");
        }
        let thr = self.display.negative_threshold_kg;
        if !(thr.is_finite() && (0.0..step).contains(&thr)) {
            eyre::bail!("display.negative_threshold_kg must be in [0, step_kg)");
        }

        // Calibration
        if self.calibration.file.trim().is_empty() {
            eyre::bail!("calibration.file must not be empty");
        }
        let f = self.calibration.default_factor;
        if !(f.is_finite() && f > 0.0) {
            eyre::bail!("calibration.default_factor must be a finite number > 0");
        }

        // Shutdown
        if self.shutdown.timeout_ms == 0 {
            eyre::bail!("shutdown.timeout_ms must be >= 1");
        }
        if self.shutdown.timeout_ms > 60_000 {
            eyre::bail!("shutdown.timeout_ms is unreasonably large (>60s)");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
