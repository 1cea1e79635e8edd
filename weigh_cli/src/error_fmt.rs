//! Human-readable error descriptions, exit codes and structured JSON errors.

use weigh_core::error::{BuildError, ScaleError};

pub const EXIT_OTHER: i32 = 1;
pub const EXIT_LAUNCH: i32 = 2;
pub const EXIT_IO: i32 = 3;
pub const EXIT_INVALID_INPUT: i32 = 4;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLauncher | BuildError::MissingSink | BuildError::MissingStore => format!(
                "What happened: The controller could not be assembled ({be}).\nLikely causes: A bug in the command wiring.\nHow to fix: Re-run with --log-level=debug and report the output."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the [display] or [device] tables.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ScaleError>() {
        return match se {
            ScaleError::Launch(detail) => format!(
                "What happened: The device program could not be started ({detail}).\nLikely causes: device.program points to a missing or non-executable file, or stdbuf is not installed.\nHow to fix: Check [device] in the config (or set line_buffered = false), then run `weigh self-check`."
            ),
            ScaleError::Io(detail) => format!(
                "What happened: Communication with the device failed ({detail}).\nLikely causes: The device program exited or closed its input.\nHow to fix: Start a new measurement; check the device program's own output for errors."
            ),
            ScaleError::NoReading => "What happened: No weight reading has been received yet (or the last one was zero).\nLikely causes: Calibration was requested before the device reported a weight, or the platform is empty.\nHow to fix: Wait for the zero calibration to finish, place the reference weight, then calibrate.".to_string(),
            ScaleError::InvalidSample(input) => format!(
                "What happened: {input:?} is not a valid reference weight.\nLikely causes: Empty input, a typo, or a zero/negative value.\nHow to fix: Enter the known weight in kg as a positive number, e.g. `c 20.00`."
            ),
            ScaleError::InvalidFactor(f) => format!(
                "What happened: The computed scale factor {f} is not usable.\nLikely causes: The current reading is negative (platform not zeroed).\nHow to fix: Tare with the platform empty, place the reference weight, then calibrate again."
            ),
            ScaleError::Persistence(detail) => format!(
                "What happened: The scale factor could not be saved ({detail}).\nLikely causes: calibration.file is in a read-only or missing location.\nHow to fix: Point calibration.file at a writable path."
            ),
            ScaleError::Device(detail) => format!(
                "What happened: The device reported an error ({detail}).\nLikely causes: The device program did not shut down cleanly.\nHow to fix: Re-run with --log-level=debug for details."
            ),
        };
    }

    // String-based heuristics for errors coming from config or logging setup
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid configuration") {
        let detail = err
            .chain()
            .nth(1)
            .map_or_else(|| msg.clone(), ToString::to_string);
        return format!(
            "What happened: Configuration is invalid or unreadable ({detail}).\nLikely causes: A missing file, a TOML syntax error, or an out-of-range value.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 launch, 3 I/O, 4 invalid input, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<ScaleError>() {
        Some(ScaleError::Launch(_)) => EXIT_LAUNCH,
        Some(ScaleError::Io(_) | ScaleError::Persistence(_)) => EXIT_IO,
        Some(ScaleError::InvalidSample(_) | ScaleError::NoReading | ScaleError::InvalidFactor(_)) => {
            EXIT_INVALID_INPUT
        }
        _ => EXIT_OTHER,
    }
}

pub fn error_kind(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<ScaleError>() {
        return match se {
            ScaleError::Launch(_) => "Launch",
            ScaleError::Io(_) => "Io",
            ScaleError::InvalidSample(_) => "InvalidSample",
            ScaleError::NoReading => "NoReading",
            ScaleError::InvalidFactor(_) => "InvalidFactor",
            ScaleError::Persistence(_) => "Persistence",
            ScaleError::Device(_) => "Device",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "reason": error_kind(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
