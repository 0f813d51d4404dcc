//! Error types for the overlay channel core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("session not started")]
    NotStarted,

    #[error("session already active")]
    AlreadyExists,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to open device {0}: {1}")]
    OpenFailed(String, String),

    #[error("capability query failed on display {0}")]
    QueryFailed(u32),

    #[error("buffer allocation failed: {0}")]
    OutOfMemory(String),

    #[error("unsupported source format 0x{0:x}")]
    UnsupportedFormat(u32),

    #[error("source changed while channel was up; call set_source again")]
    Retry,
}
