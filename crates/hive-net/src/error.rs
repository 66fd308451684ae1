//! Error types for network-lifecycle operations

use thiserror::Error;

/// Main error type for network-lifecycle operations
#[derive(Error, Debug)]
pub enum NetError {
    /// Requested channel is outside the 11..=26 band
    #[error("Invalid channel: {0}")]
    InvalidChannel(u8),

    /// A change was requested while another one is running
    #[error("State machine busy in state {0}")]
    Busy(&'static str),

    /// No firmware file matching the coordinator was found
    #[error("No firmware update file found")]
    NoUpdateFile,

    /// External flasher process failed
    #[error("Flasher failed: {0}")]
    FlasherFailed(String),
}

impl NetError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            NetError::InvalidChannel(_) => "INVALID_CHANNEL",
            NetError::Busy(_) => "BUSY",
            NetError::NoUpdateFile => "NO_UPDATE_FILE",
            NetError::FlasherFailed(_) => "FLASHER_FAILED",
        }
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(self, NetError::Busy(_))
    }
}

/// Result type alias for network-lifecycle operations
pub type Result<T> = std::result::Result<T, NetError>;
