use std::time::{Duration, Instant};

use tempfile::tempdir;
use weigh_core::error::ScaleError;
use weigh_core::mocks::RecordingSink;
use weigh_core::{
    CalibrationState, CalibrationStore, Controller, ScaleEvent, ScaleFactor, TOTAL_STEPS,
};
use weigh_device::{SimProbe, SimulatedLauncher};

const DEADLINE: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

struct Rig {
    controller: Controller,
    events: RecordingSink,
    probe: SimProbe,
    _dir: tempfile::TempDir,
}

fn rig(launcher: SimulatedLauncher) -> Rig {
    rig_with_factor(launcher, None)
}

fn rig_with_factor(launcher: SimulatedLauncher, factor: Option<ScaleFactor>) -> Rig {
    let dir = tempdir().expect("tempdir");
    let store = CalibrationStore::new(dir.path().join("scale_factor.txt"), ScaleFactor::DEFAULT);
    let events = RecordingSink::new();
    let probe = launcher.probe();
    let mut builder = Controller::builder()
        .with_launcher(launcher)
        .with_sink(events.clone())
        .with_store(store);
    if let Some(f) = factor {
        builder = builder.with_scale_factor(f);
    }
    Rig {
        controller: builder.build().expect("build"),
        events,
        probe,
        _dir: dir,
    }
}

/// Poll until the device closes its output.
fn drain(c: &mut Controller) {
    let start = Instant::now();
    while c.has_session() && start.elapsed() < DEADLINE {
        c.poll_timeout(POLL);
    }
    assert!(!c.has_session(), "device did not close in time");
}

fn poll_until(c: &mut Controller, mut done: impl FnMut(&Controller) -> bool) {
    let start = Instant::now();
    while !done(c) && start.elapsed() < DEADLINE {
        c.poll_timeout(POLL);
    }
    assert!(done(c), "condition not reached in time");
}

fn scale_error(err: &eyre::Report) -> Option<&ScaleError> {
    err.downcast_ref::<ScaleError>()
}

#[test]
fn calibration_run_reports_progress_and_one_ready() {
    let lines: Vec<String> = (0..=TOTAL_STEPS).map(|i| format!("CALIB:{i}")).collect();
    let mut r = rig(SimulatedLauncher::scripted(lines));
    r.controller.start_measurement().expect("start");
    drain(&mut r.controller);

    let events = r.events.snapshot();
    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            ScaleEvent::CalibrationProgressChanged { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert_eq!(fractions.len(), 41);
    assert_eq!(fractions[0], 0.0);
    assert!((fractions[40] - 1.0).abs() < f64::EPSILON);
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        r.events.count(|e| matches!(e, ScaleEvent::CalibrationReady)),
        1
    );
    assert_eq!(events.last(), Some(&ScaleEvent::MeasurementStopped));
    assert_eq!(r.controller.calibration(), CalibrationState::Ready);
}

#[test]
fn weight_line_is_quantized_and_displayed() {
    let mut r = rig(SimulatedLauncher::scripted(["CALIB:40", "PESO:3456"]));
    r.controller.start_measurement().expect("start");
    drain(&mut r.controller);

    let weights: Vec<ScaleEvent> = r
        .events
        .snapshot()
        .into_iter()
        .filter(|e| matches!(e, ScaleEvent::WeightUpdated { .. }))
        .collect();
    match weights.as_slice() {
        [ScaleEvent::WeightUpdated { text, negative, .. }] => {
            assert_eq!(text, "3.45 kg");
            assert!(!negative);
        }
        other => panic!("unexpected weights: {other:?}"),
    }
    let raw = r.controller.last_raw().expect("reading");
    assert!((raw - 3.456).abs() < 1e-12);
}

#[test]
fn output_is_applied_in_arrival_order() {
    let mut r = rig(SimulatedLauncher::scripted([
        "PESO:1000",
        "garbage",
        "PESO:2000",
        "CALIB:1",
        "PESO:3000",
    ]));
    r.controller.start_measurement().expect("start");
    drain(&mut r.controller);

    let texts: Vec<String> = r
        .events
        .snapshot()
        .into_iter()
        .filter_map(|e| match e {
            ScaleEvent::WeightUpdated { text, .. } => Some(text),
            ScaleEvent::CalibrationProgressChanged { step, .. } => Some(format!("calib {step}")),
            _ => None,
        })
        .collect();
    assert_eq!(texts, ["1.00 kg", "2.00 kg", "calib 1", "3.00 kg"]);
}

#[test]
fn calibrate_without_reading_fails_with_no_reading() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    let err = r.controller.calibrate_with_sample(5.0).expect_err("no reading");
    assert!(matches!(scale_error(&err), Some(ScaleError::NoReading)));
    assert_eq!(r.controller.scale_factor(), ScaleFactor::DEFAULT);
}

#[test]
fn calibrate_with_zero_raw_fails_regardless_of_input() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.handle_line("RAW:0");
    for input in [5.0, -1.0, f64::NAN, 0.0] {
        let err = r
            .controller
            .calibrate_with_sample(input)
            .expect_err("zero raw");
        assert!(matches!(scale_error(&err), Some(ScaleError::NoReading)));
    }
    assert_eq!(r.controller.scale_factor(), ScaleFactor::DEFAULT);
    assert_eq!(
        r.events
            .count(|e| matches!(e, ScaleEvent::ScaleFactorChanged { .. })),
        0
    );
}

#[test]
fn calibrate_computes_persists_and_reports_factor() {
    let f0 = ScaleFactor::new(0.995).expect("factor");
    let mut r = rig_with_factor(SimulatedLauncher::scripted(Vec::<String>::new()), Some(f0));
    r.controller.handle_line("RAW:20.0");

    let f = r.controller.calibrate_with_sample(20.00).expect("calibrate");
    assert!((f.get() - 1.0).abs() < 1e-9);
    assert_eq!(r.controller.scale_factor(), f);
    assert_eq!(r.controller.store().load(), f);
    assert!(r.events.snapshot().contains(&ScaleEvent::ScaleFactorChanged { factor: f.get() }));
}

#[test]
fn recalibrating_a_displayed_weight_scales_the_old_factor() {
    let f0 = ScaleFactor::new(19.90 / 797.2).expect("factor");
    let mut r = rig_with_factor(SimulatedLauncher::scripted(Vec::<String>::new()), Some(f0));
    r.controller.handle_line("RAW:797.2");
    assert!(matches!(
        r.events.snapshot().as_slice(),
        [ScaleEvent::WeightUpdated { text, .. }] if text == "19.90 kg"
    ));

    let f = r.controller.calibrate_with_sample(20.0).expect("calibrate");
    let expected = f0.get() * (20.0 / 19.90);
    assert!((f.get() - expected).abs() < 1e-9, "{} vs {expected}", f.get());
}

#[test]
fn failed_save_keeps_the_new_factor_in_memory() {
    let dir = tempdir().expect("tempdir");
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, "x").expect("write blocker");
    let store = CalibrationStore::new(blocker.join("scale_factor.txt"), ScaleFactor::DEFAULT);
    let events = RecordingSink::new();
    let mut c = Controller::builder()
        .with_launcher(SimulatedLauncher::scripted(Vec::<String>::new()))
        .with_sink(events.clone())
        .with_store(store)
        .build()
        .expect("build");

    c.handle_line("RAW:5");
    let f = c.calibrate_with_sample(10.0).expect("calibrate despite store failure");
    assert!((f.get() - 2.0).abs() < 1e-12);
    assert_eq!(c.scale_factor(), f);
    assert!(events.snapshot().contains(&ScaleEvent::ScaleFactorChanged { factor: f.get() }));
    assert_eq!(c.store().load(), ScaleFactor::DEFAULT);

    events.take();
    c.handle_line("RAW:5");
    assert!(matches!(
        events.snapshot().as_slice(),
        [ScaleEvent::WeightUpdated { text, .. }] if text == "10.00 kg"
    ));
}

#[test]
fn calibrate_in_grams_dialect_uses_kg_raw() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.handle_line("PESO:2000");
    let f = r.controller.calibrate_with_sample(2.5).expect("calibrate");
    assert!((f.get() - 1.25).abs() < 1e-12);

    r.events.take();
    r.controller.handle_line("PESO:2000");
    assert!(matches!(
        r.events.snapshot().as_slice(),
        [ScaleEvent::WeightUpdated { text, .. }] if text == "2.50 kg"
    ));
}

#[test]
fn invalid_sample_leaves_factor_untouched() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.handle_line("RAW:4.0");
    for bad in [0.0, -2.0, f64::NAN, f64::INFINITY] {
        let err = r.controller.calibrate_with_sample(bad).expect_err("invalid");
        assert!(matches!(scale_error(&err), Some(ScaleError::InvalidSample(_))));
    }
    for bad in ["", "abc", "1.2.3"] {
        let err = r.controller.calibrate_with_input(bad).expect_err("invalid");
        assert!(matches!(scale_error(&err), Some(ScaleError::InvalidSample(_))));
    }
    assert_eq!(r.controller.scale_factor(), ScaleFactor::DEFAULT);
}

#[test]
fn negative_reading_gives_invalid_factor() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.handle_line("RAW:-4.0");
    let err = r.controller.calibrate_with_sample(2.0).expect_err("negative factor");
    assert!(matches!(scale_error(&err), Some(ScaleError::InvalidFactor(f)) if *f == -0.5));
    assert_eq!(r.controller.scale_factor(), ScaleFactor::DEFAULT);
}

#[test]
fn keypad_input_accepts_decimal_comma() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.handle_line("RAW:10");
    let f = r.controller.calibrate_with_input(" 20,00 ").expect("calibrate");
    assert!((f.get() - 2.0).abs() < 1e-12);
}

#[test]
fn tare_mid_calibration_restarts_and_sends_one_command() {
    let lines: Vec<String> = (1..=25).map(|i| format!("CALIB:{i}")).collect();
    let mut r = rig(SimulatedLauncher::scripted_open(lines));
    r.controller.start_measurement().expect("start");
    poll_until(&mut r.controller, |c| {
        c.calibration() == CalibrationState::InProgress(25)
    });
    r.events.take();

    r.controller.tare().expect("tare");
    assert_eq!(r.controller.calibration(), CalibrationState::InProgress(0));
    assert_eq!(r.probe.sent_count(b't'), 1);
    assert_eq!(
        r.events.snapshot(),
        [
            ScaleEvent::Recalibrating,
            ScaleEvent::CalibrationProgressChanged {
                step: 0,
                fraction: 0.0
            },
        ]
    );
    r.controller.shutdown().expect("shutdown");
}

#[test]
fn tare_without_session_is_a_no_op() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.tare().expect("no-op");
    assert!(r.events.snapshot().is_empty());
    assert!(r.probe.sent().is_empty());
    assert_eq!(r.controller.calibration(), CalibrationState::Idle);
}

#[test]
fn device_reset_line_restarts_calibration_once() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.handle_line("CALIB:30");
    r.controller.handle_line("RESET_START");
    r.controller.handle_line("RESET_START");
    assert_eq!(r.controller.calibration(), CalibrationState::InProgress(0));
    assert_eq!(r.events.count(|e| matches!(e, ScaleEvent::Recalibrating)), 1);
}

#[test]
fn unrecognized_lines_emit_nothing() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    for line in ["", "Fine programma.", "PESO:abc", "hello"] {
        r.controller.handle_line(line);
    }
    assert!(r.events.snapshot().is_empty());
    assert_eq!(r.controller.last_raw(), None);
}

#[test]
fn double_shutdown_terminates_once() {
    let mut r = rig(SimulatedLauncher::scripted_open(["CALIB:1"]));
    r.controller.start_measurement().expect("start");
    r.controller.shutdown().expect("first");
    r.controller.shutdown().expect("second");
    assert_eq!(r.probe.stops(), 1);
    assert_eq!(
        r.events.count(|e| matches!(e, ScaleEvent::MeasurementStopped)),
        1
    );
    assert!(!r.controller.has_session());
}

#[test]
fn shutdown_without_session_is_ok() {
    let mut r = rig(SimulatedLauncher::scripted(Vec::<String>::new()));
    r.controller.shutdown().expect("no session");
    assert!(r.events.snapshot().is_empty());
    assert_eq!(r.probe.stops(), 0);
}

#[test]
fn start_measurement_twice_launches_once() {
    let mut r = rig(SimulatedLauncher::scripted_open(Vec::<String>::new()));
    r.controller.start_measurement().expect("first");
    r.controller.start_measurement().expect("second");
    assert_eq!(r.probe.launches(), 1);
    assert_eq!(r.probe.sent_count(b'\n'), 1);
    r.controller.shutdown().expect("shutdown");
}

#[test]
fn session_can_be_restarted_after_device_closes() {
    let mut r = rig(SimulatedLauncher::scripted(["CALIB:40"]));
    r.controller.start_measurement().expect("start");
    drain(&mut r.controller);
    assert_eq!(r.controller.calibration(), CalibrationState::Ready);

    r.controller.start_measurement().expect("restart");
    assert_eq!(r.controller.calibration(), CalibrationState::Idle);
    drain(&mut r.controller);
    assert_eq!(r.probe.launches(), 2);
    assert_eq!(
        r.events.count(|e| matches!(e, ScaleEvent::CalibrationReady)),
        2
    );
}

#[test]
fn restart_applies_output_left_by_an_unpolled_session() {
    let mut r = rig(SimulatedLauncher::scripted(["CALIB:40", "PESO:3456"]));
    r.controller.start_measurement().expect("start");
    let start = Instant::now();
    while r.controller.is_running() && start.elapsed() < DEADLINE {
        std::thread::sleep(POLL);
    }
    assert!(!r.controller.is_running(), "device did not exit in time");
    assert!(r.events.snapshot().is_empty());

    r.controller.start_measurement().expect("restart");
    assert_eq!(r.probe.launches(), 2);
    assert_eq!(r.controller.last_raw(), Some(3.456));

    let events = r.events.snapshot();
    let ready = events
        .iter()
        .position(|e| matches!(e, ScaleEvent::CalibrationReady))
        .expect("ready");
    let weight = events
        .iter()
        .position(|e| matches!(e, ScaleEvent::WeightUpdated { text, .. } if text == "3.45 kg"))
        .expect("weight");
    let stopped = events
        .iter()
        .position(|e| matches!(e, ScaleEvent::MeasurementStopped))
        .expect("stopped");
    assert!(ready < weight && weight < stopped, "out of order: {events:?}");
    assert_eq!(
        r.events.count(|e| matches!(e, ScaleEvent::MeasurementStopped)),
        1
    );
    r.controller.shutdown().expect("shutdown");
}

#[test]
fn launch_failure_is_reported_and_controller_survives() {
    let mut r = rig(SimulatedLauncher::failing());
    let err = r.controller.start_measurement().expect_err("launch fails");
    assert!(matches!(scale_error(&err), Some(ScaleError::Launch(_))));
    assert!(!r.controller.has_session());
    assert!(matches!(
        r.events.snapshot().as_slice(),
        [ScaleEvent::ErrorOccurred { .. }]
    ));
    r.controller.shutdown().expect("still usable");
}

#[test]
fn drop_stops_a_live_session() {
    let r = rig(SimulatedLauncher::scripted_open(Vec::<String>::new()));
    let Rig {
        mut controller,
        probe,
        ..
    } = r;
    controller.start_measurement().expect("start");
    drop(controller);
    assert_eq!(probe.stops(), 1);
}

#[test]
fn load_cell_tare_runs_a_second_calibration() {
    let mut r = rig(SimulatedLauncher::load_cell(3456.0, Duration::from_millis(1)));
    r.controller.start_measurement().expect("start");
    let events = r.events.clone();
    poll_until(&mut r.controller, |_| {
        events.count(|e| matches!(e, ScaleEvent::WeightUpdated { .. })) > 0
    });

    r.controller.tare().expect("tare");
    poll_until(&mut r.controller, |_| {
        events.count(|e| matches!(e, ScaleEvent::CalibrationReady)) == 2
    });
    assert!(r.events.snapshot().iter().any(
        |e| matches!(e, ScaleEvent::WeightUpdated { text, .. } if text == "3.45 kg")
    ));
    r.controller.shutdown().expect("shutdown");
    assert_eq!(r.probe.sent_count(b't'), 1);
}
