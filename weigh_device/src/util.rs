use std::time::Duration;

use weigh_traits::Clock;

use crate::error::{DeviceError, Result};

/// Poll `is_done` until it returns true or `timeout` expires.
/// Sleeps `poll_interval` between checks to avoid CPU spinning.
pub fn wait_until_with_timeout(
    mut is_done: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
    clock: &impl Clock,
) -> Result<()> {
    let deadline = clock.now() + timeout;
    while !is_done() {
        if clock.now() >= deadline {
            return Err(DeviceError::StopTimeout);
        }
        clock.sleep(poll_interval);
    }
    Ok(())
}

/// Strip trailing whitespace (including `\r\n`) from a raw output line.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_string()
}

/// Locate `program` the way the OS would when spawning it: names containing
/// a path separator are checked directly, bare names are searched on `PATH`.
pub fn resolve_program(program: &str) -> Option<std::path::PathBuf> {
    use std::path::Path;

    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}
