//! Subcommand implementations: measurement session, factor store, self-check.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel as xch;
use serde_json::json;
use weigh_core::error::ScaleError;
use weigh_core::runner::{self, Command, RunOutcome};
use weigh_core::store::parse_factor;
use weigh_core::{CalibrationStore, CallbackSink, Controller, ControllerCfg, ScaleEvent};
use weigh_device::util::resolve_program;
use weigh_device::{ProcessLauncher, ProcessSpec, SimulatedLauncher};
use weigh_traits::Launcher;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const SIM_PERIOD: Duration = Duration::from_millis(100);

pub fn process_spec(cfg: &weigh_config::DeviceCfg) -> ProcessSpec {
    ProcessSpec::new(&cfg.program)
        .with_args(cfg.args.iter().cloned())
        .line_buffered(cfg.line_buffered)
}

/// `weigh run`: measure until the device closes, `q` is typed, or Ctrl-C.
pub fn run(cfg: &weigh_config::Config, simulate: bool, sim_grams: f64, json: bool) -> eyre::Result<RunOutcome> {
    if simulate {
        tracing::info!(grams = sim_grams, "using simulated load cell");
        run_with(SimulatedLauncher::load_cell(sim_grams, SIM_PERIOD), cfg, json)
    } else {
        let spec = process_spec(&cfg.device);
        tracing::info!(program = %spec.program, line_buffered = spec.line_buffered, "using device program");
        run_with(ProcessLauncher::new(spec), cfg, json)
    }
}

fn run_with(
    launcher: impl Launcher + 'static,
    cfg: &weigh_config::Config,
    json: bool,
) -> eyre::Result<RunOutcome> {
    let mut controller = Controller::builder()
        .with_launcher(launcher)
        .with_sink(CallbackSink(move |e: ScaleEvent| print_event(&e, json)))
        .with_store(CalibrationStore::from(&cfg.calibration))
        .with_config(ControllerCfg::from(cfg))
        .build()?;
    tracing::info!(factor = controller.scale_factor().get(), "scale factor in use");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "cannot install Ctrl-C handler");
        }
    }

    let commands = spawn_console_reader();
    let outcome = runner::run(&mut controller, &commands, &stop, POLL_INTERVAL)?;
    tracing::info!(?outcome, "session ended");
    Ok(outcome)
}

/// Forward console lines as commands. The channel closes at end of input.
fn spawn_console_reader() -> xch::Receiver<Command> {
    let (tx, rx) = xch::unbounded();
    let spawned = std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => eprintln!("unknown command {:?}; use t, c <kg> or q", line.trim()),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "console reader not started; commands disabled");
    }
    rx
}

fn print_event(event: &ScaleEvent, json: bool) {
    let line = if json {
        event_json(event).to_string()
    } else {
        event_text(event)
    };
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

pub fn event_text(event: &ScaleEvent) -> String {
    match event {
        ScaleEvent::CalibrationProgressChanged { step, fraction } => format!(
            "calibrating {step}/{} ({:.0}%)",
            weigh_core::TOTAL_STEPS,
            fraction * 100.0
        ),
        ScaleEvent::CalibrationReady => "calibration ready".to_string(),
        ScaleEvent::Recalibrating => "recalibrating".to_string(),
        ScaleEvent::WeightUpdated { text, negative, .. } => {
            if *negative {
                format!("{text} (negative)")
            } else {
                text.clone()
            }
        }
        ScaleEvent::ScaleFactorChanged { factor } => format!("scale factor set to {factor}"),
        ScaleEvent::ErrorOccurred { message } => format!("error: {message}"),
        ScaleEvent::MeasurementStopped => "measurement stopped".to_string(),
    }
}

pub fn event_json(event: &ScaleEvent) -> serde_json::Value {
    match event {
        ScaleEvent::CalibrationProgressChanged { step, fraction } => {
            json!({ "event": "calibration_progress", "step": step, "fraction": fraction })
        }
        ScaleEvent::CalibrationReady => json!({ "event": "calibration_ready" }),
        ScaleEvent::Recalibrating => json!({ "event": "recalibrating" }),
        ScaleEvent::WeightUpdated { kg, text, negative } => {
            json!({ "event": "weight", "kg": kg, "text": text, "negative": negative })
        }
        ScaleEvent::ScaleFactorChanged { factor } => {
            json!({ "event": "scale_factor", "factor": factor })
        }
        ScaleEvent::ErrorOccurred { message } => json!({ "event": "error", "message": message }),
        ScaleEvent::MeasurementStopped => json!({ "event": "stopped" }),
    }
}

/// `weigh factor show`
pub fn factor_show(cfg: &weigh_config::Config, json: bool) {
    let store = CalibrationStore::from(&cfg.calibration);
    let factor = store.load();
    if json {
        println!(
            "{}",
            json!({ "factor": factor.get(), "file": store.path().display().to_string() })
        );
    } else {
        println!("{factor}");
    }
}

/// `weigh factor set <value>`
pub fn factor_set(cfg: &weigh_config::Config, value: &str, json: bool) -> eyre::Result<()> {
    let factor = parse_factor(value)
        .ok_or_else(|| eyre::Report::new(ScaleError::InvalidSample(value.trim().to_string())))?;
    let store = CalibrationStore::from(&cfg.calibration);
    store.try_save(factor)?;
    if json {
        println!(
            "{}",
            json!({ "factor": factor.get(), "file": store.path().display().to_string() })
        );
    } else {
        println!("scale factor set to {factor} ({})", store.path().display());
    }
    Ok(())
}

/// `weigh self-check`: the config was already validated on load; check the programs.
pub fn self_check(cfg: &weigh_config::Config, json: bool) -> eyre::Result<()> {
    let spec = process_spec(&cfg.device);
    for program in spec.required_programs() {
        match resolve_program(program) {
            Some(path) => tracing::debug!(program, path = %path.display(), "resolved"),
            None => {
                return Err(eyre::Report::new(ScaleError::Launch(format!(
                    "{program}: not found"
                ))));
            }
        }
    }
    if json {
        println!("{}", json!({ "status": "ok", "program": spec.program }));
    } else {
        println!("ok: config valid, device program {} found", spec.program);
    }
    Ok(())
}
