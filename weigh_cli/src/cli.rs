//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (events and errors).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Config file used when `--config` is not given. Defaults apply if it is absent.
pub const DEFAULT_CONFIG: &str = "weigh.toml";

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "weigh", version, about = "Weighing scale acquisition and calibration")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print events and errors as JSON lines instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start measuring; reads `t` (tare), `c <kg>` (calibrate), `q` (quit) from stdin
    Run {
        /// Use the built-in simulated load cell instead of the device program
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
        /// Weight on the simulated platform, in grams
        #[arg(long, value_name = "GRAMS", default_value_t = 0.0, requires = "simulate")]
        sim_grams: f64,
    },
    /// Inspect or overwrite the stored scale factor
    Factor {
        #[command(subcommand)]
        action: FactorCmd,
    },
    /// Validate the config and check that the device program can be found
    SelfCheck,
}

#[derive(Subcommand, Debug)]
pub enum FactorCmd {
    /// Print the stored factor (or the default when none is stored)
    Show,
    /// Store a new factor
    Set {
        /// Positive finite multiplier
        #[arg(allow_negative_numbers = true)]
        value: String,
    },
}
