use thiserror::Error;

use crate::status::HwStatus;

#[derive(Debug, Error, Clone)]
pub enum SprinklerError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("operation finished with {0}")]
    Status(HwStatus),
    #[error("io error: {0}")]
    Io(String),
}

impl SprinklerError {
    /// The hardware status carried by this error, if any.
    pub fn status(&self) -> Option<HwStatus> {
        match self {
            Self::Status(s) => Some(*s),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing i2c bus")]
    MissingBus,
    #[error("missing nozzle motor")]
    MissingNozzleMotor,
    #[error("missing valve motor")]
    MissingValveMotor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("failed to start bus worker: {0}")]
    Spawn(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
