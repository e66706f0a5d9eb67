use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("device disconnected")]
    Disconnected,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
