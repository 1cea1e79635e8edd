#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use weigh_device::error::DeviceError;
use weigh_device::{ProcessLauncher, ProcessSpec};
use weigh_traits::{DeviceOutput, OutputSink};

fn collecting_sink() -> (OutputSink, Arc<Mutex<Vec<DeviceOutput>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_sink = seen.clone();
    let sink: OutputSink = Arc::new(move |out| seen_sink.lock().unwrap().push(out));
    (sink, seen)
}

fn wait_for(seen: &Arc<Mutex<Vec<DeviceOutput>>>, pred: impl Fn(&[DeviceOutput]) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if pred(&seen.lock().unwrap()) {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition not reached; saw {:?}", seen.lock().unwrap());
}

fn sh(script: &str) -> ProcessLauncher {
    ProcessLauncher::new(ProcessSpec::new("sh").with_args(["-c", script]))
}

#[test]
fn missing_program_is_a_launch_error() {
    let launcher = ProcessLauncher::new(ProcessSpec::new("/nonexistent/leggi_peso"));
    let (sink, _seen) = collecting_sink();
    match launcher.spawn(sink) {
        Err(DeviceError::Launch { program, .. }) => assert_eq!(program, "/nonexistent/leggi_peso"),
        other => panic!("expected launch error, got {other:?}"),
    }
}

#[test]
fn lines_are_stripped_and_stream_closes_on_exit() {
    // `read` consumes the start gate before anything is printed.
    let launcher = sh("read gate; printf 'CALIB:1  \\r\\nPESO:300\\n'");
    let (sink, seen) = collecting_sink();
    let _device = launcher.spawn(sink).unwrap();

    wait_for(&seen, |s| s.contains(&DeviceOutput::Closed));
    let got = seen.lock().unwrap().clone();
    assert_eq!(
        got,
        vec![
            DeviceOutput::Line("CALIB:1".into()),
            DeviceOutput::Line("PESO:300".into()),
            DeviceOutput::Closed,
        ]
    );
}

#[test]
fn device_stdin_is_a_pipe_not_the_terminal() {
    let launcher = sh("read gate; if [ -t 0 ]; then echo TTY; else echo PIPE; fi");
    let (sink, seen) = collecting_sink();
    let _device = launcher.spawn(sink).unwrap();

    wait_for(&seen, |s| s.contains(&DeviceOutput::Closed));
    assert!(seen.lock().unwrap().contains(&DeviceOutput::Line("PIPE".into())));
}

#[test]
fn stderr_is_forwarded_as_lines() {
    let launcher = sh("echo 'Errore apertura SPI' >&2");
    let (sink, seen) = collecting_sink();
    let _device = launcher.spawn(sink).unwrap();

    wait_for(&seen, |s| {
        s.contains(&DeviceOutput::Line("Errore apertura SPI".into()))
    });
}

#[test]
fn control_bytes_reach_the_program() {
    // Echo back the first byte after the start gate.
    let launcher = sh("read gate; c=$(dd bs=1 count=1 2>/dev/null); echo \"GOT:$c\"");
    let (sink, seen) = collecting_sink();
    let mut device = launcher.spawn(sink).unwrap();

    device.send_bytes(b"t").unwrap();
    wait_for(&seen, |s| s.contains(&DeviceOutput::Line("GOT:t".into())));
}

#[test]
fn send_after_exit_fails_with_exited() {
    let launcher = sh("exit 0");
    let (sink, seen) = collecting_sink();
    let mut device = launcher.spawn(sink).unwrap_or_else(|e| panic!("spawn: {e}"));

    wait_for(&seen, |s| s.contains(&DeviceOutput::Closed));
    let deadline = Instant::now() + Duration::from_secs(5);
    while !device.has_exited() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    match device.send_bytes(b"t") {
        Err(DeviceError::Exited) => {}
        other => panic!("expected Exited, got {other:?}"),
    }
}

#[test]
fn shutdown_terminates_a_running_program_and_is_idempotent() {
    let launcher = sh("exec sleep 30");
    let (sink, _seen) = collecting_sink();
    let mut device = launcher.spawn(sink).unwrap();
    assert!(device.id().is_some());

    let start = Instant::now();
    device.shutdown(Duration::from_millis(500)).unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(device.id().is_none());

    device.shutdown(Duration::from_millis(500)).unwrap();
}

#[test]
fn shutdown_escalates_to_kill_when_terminate_is_ignored() {
    let launcher = sh("trap '' TERM; read gate; echo ready; while true; do sleep 1; done");
    let (sink, seen) = collecting_sink();
    let mut device = launcher.spawn(sink).unwrap();
    wait_for(&seen, |s| s.contains(&DeviceOutput::Line("ready".into())));

    let start = Instant::now();
    device.shutdown(Duration::from_millis(100)).unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(device.has_exited());
}
