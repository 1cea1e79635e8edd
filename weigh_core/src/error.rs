use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScaleError {
    #[error("cannot launch device: {0}")]
    Launch(String),
    #[error("device i/o error: {0}")]
    Io(String),
    #[error("invalid calibration sample: {0:?}")]
    InvalidSample(String),
    #[error("no weight reading received yet")]
    NoReading,
    #[error("computed scale factor {0} is not a positive finite number")]
    InvalidFactor(f64),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("device error: {0}")]
    Device(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing device launcher")]
    MissingLauncher,
    #[error("missing event sink")]
    MissingSink,
    #[error("missing calibration store")]
    MissingStore,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
