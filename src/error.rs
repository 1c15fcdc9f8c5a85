use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReparseError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not a reparse point")]
    NotAReparsePoint,

    #[error("Failed to open handle: error code {code}")]
    OpenFailed { code: u32 },

    #[error("Device control request failed: error code {code}")]
    DeviceControlFailed { code: u32 },

    #[error("Reparse points are only supported on Windows")]
    UnsupportedPlatform,
}

pub type ReparseResult<T> = Result<T, ReparseError>;
