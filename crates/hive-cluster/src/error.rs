//! Error types for dispatch and outbound requests
//!
//! Inbound decode problems never surface here; they are logged and the
//! frame dropped. `ClusterError` covers the outbound path and API-visible
//! dispatch failures.

use thiserror::Error;

/// Main error type for cluster operations
#[derive(Error, Debug)]
pub enum ClusterError {
    // ===== Outbound Errors =====
    /// Host radio link is not connected
    #[error("Host link not connected")]
    NotConnected,

    /// Host rejected or failed to send a request
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A pending request expired without confirmation
    #[error("Request timed out: aps_req_id={aps_req_id}")]
    Timeout {
        /// Request id of the expired entry
        aps_req_id: u8,
    },

    // ===== Model Errors =====
    /// Resource-model failure while applying a frame
    #[error("Core error: {0}")]
    Core(#[from] hive_core::CoreError),
}

impl ClusterError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            ClusterError::NotConnected => "NOT_CONNECTED",
            ClusterError::SendFailed(_) => "SEND_FAILED",
            ClusterError::Timeout { .. } => "TIMEOUT",
            ClusterError::Core(_) => "CORE_ERROR",
        }
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ClusterError::NotConnected | ClusterError::SendFailed(_) | ClusterError::Timeout { .. }
        )
    }
}

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;
