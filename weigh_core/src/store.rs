//! Persisted scale factor: a plain-text file holding one decimal number.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScaleError};
use crate::types::ScaleFactor;

#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
    default: ScaleFactor,
}

impl CalibrationStore {
    pub fn new(path: impl AsRef<Path>, default: ScaleFactor) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            default,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_factor(&self) -> ScaleFactor {
        self.default
    }

    /// Stored factor, or the default when the file is missing or does not
    /// hold a positive finite number. Never fails.
    pub fn load(&self) -> ScaleFactor {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no stored scale factor; using default");
                return self.default;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read scale factor; using default");
                return self.default;
            }
        };
        match parse_factor(&text) {
            Some(f) => {
                tracing::debug!(path = %self.path.display(), factor = f.get(), "scale factor loaded");
                f
            }
            None => {
                tracing::warn!(path = %self.path.display(), contents = %text.trim(), "invalid stored scale factor; using default");
                self.default
            }
        }
    }

    /// Persist `factor`, logging failures. The in-memory factor stays authoritative.
    pub fn save(&self, factor: ScaleFactor) {
        if let Err(e) = self.try_save(factor) {
            tracing::warn!(path = %self.path.display(), error = %e, "scale factor not persisted");
        }
    }

    /// Persist `factor`, returning `ScaleError::Persistence` on failure.
    pub fn try_save(&self, factor: ScaleFactor) -> Result<()> {
        write_atomic(&self.path, format!("{factor}\n").as_bytes()).map_err(|e| {
            eyre::Report::new(ScaleError::Persistence(format!(
                "{}: {e}",
                self.path.display()
            )))
        })?;
        tracing::info!(path = %self.path.display(), factor = factor.get(), "scale factor saved");
        Ok(())
    }
}

/// Parse stored text into a factor. Surrounding whitespace is ignored.
pub fn parse_factor(text: &str) -> Option<ScaleFactor> {
    text.trim().parse::<f64>().ok().and_then(ScaleFactor::new)
}

/// Write to `<path>.new`, flush to disk, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".new");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}
