use plusmaze_traits::Arm;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MazeError {
    /// Transport or board failure. Never retried.
    #[error("device error: {0}")]
    Device(String),
    #[error("animal not at start arm (expected {expected}, detected {detected})")]
    PreconditionFailed { expected: Arm, detected: Arm },
    #[error("invalid state: {0}")]
    State(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing register port")]
    MissingPort,
    #[error("missing device profile")]
    MissingProfile,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
