use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("device has already exited")]
    Exited,
    #[error("timed out waiting for device to exit")]
    StopTimeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
