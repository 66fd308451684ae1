//! Error types for bundle operations
//!
//! Every validation failure of an uploaded bundle maps onto the single API
//! error `invalid-ddf-bundle`; the variants below carry the detail for logs.

use thiserror::Error;

/// Main error type for bundle operations
#[derive(Error, Debug)]
pub enum DdfError {
    // ===== Container Errors =====
    /// Outer chunk tag is not `RIFF`
    #[error("Not a bundle: outer chunk is {0:?}, expected RIFF")]
    NotRiff([u8; 4]),

    /// `RIFF` container has no `DDFB` child
    #[error("Bundle has no DDFB chunk")]
    MissingDdfb,

    /// A chunk declares more bytes than remain in the file
    #[error("Truncated chunk {tag:?}: declared {declared} bytes, {remaining} remaining")]
    TruncatedChunk {
        /// Four-character chunk tag
        tag: [u8; 4],
        /// Declared payload length
        declared: usize,
        /// Bytes actually remaining
        remaining: usize,
    },

    /// File shorter than one chunk header
    #[error("Bundle too short: {0} bytes")]
    TooShort(usize),

    // ===== Descriptor Errors =====
    /// `DDFB` chunk has no `DESC` child
    #[error("Bundle has no DESC chunk")]
    MissingDescriptor,

    /// `DESC` chunk is not valid JSON of the expected shape
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(#[from] serde_json::Error),

    /// A required descriptor key is absent or empty
    #[error("Descriptor missing required key: {0}")]
    MissingKey(&'static str),

    // ===== Store Errors =====
    /// No bundle stored under the given hash
    #[error("No bundle with hash {0}")]
    NotFound(String),

    /// Hash string is not 64 hex characters
    #[error("Invalid bundle hash: {0}")]
    InvalidHash(String),

    /// Filesystem failure in the bundle store
    #[error("Bundle store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DdfError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            DdfError::NotRiff(_) => "NOT_RIFF",
            DdfError::MissingDdfb => "MISSING_DDFB",
            DdfError::TruncatedChunk { .. } => "TRUNCATED_CHUNK",
            DdfError::TooShort(_) => "TOO_SHORT",
            DdfError::MissingDescriptor => "MISSING_DESC",
            DdfError::MalformedDescriptor(_) => "MALFORMED_DESC",
            DdfError::MissingKey(_) => "MISSING_KEY",
            DdfError::NotFound(_) => "NOT_FOUND",
            DdfError::InvalidHash(_) => "INVALID_HASH",
            DdfError::Io(_) => "IO_ERROR",
        }
    }

    /// True when the error means the uploaded bytes are not a valid bundle,
    /// as opposed to a store-side failure.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            DdfError::NotFound(_) | DdfError::InvalidHash(_) | DdfError::Io(_)
        )
    }
}

/// Result type alias for bundle operations
pub type Result<T> = std::result::Result<T, DdfError>;
