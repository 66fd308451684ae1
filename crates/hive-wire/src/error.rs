//! Error types for frame codec operations
//!
//! Frame-level failures are recoverable by design: a decode underflow or an
//! unknown type tag discards the frame or the offending record, it never
//! surfaces to API callers.

use thiserror::Error;

/// Main error type for wire codec operations
#[derive(Error, Debug)]
pub enum WireError {
    // ===== Stream Errors =====
    /// Read past the end of the frame payload
    #[error("Stream underflow: needed {needed} bytes, {remaining} remaining")]
    Underflow {
        /// Bytes the read required
        needed: usize,
        /// Bytes left in the stream
        remaining: usize,
    },

    /// Data type tag not known to the codec
    #[error("Unknown data type tag: 0x{0:02X}")]
    UnknownDataType(u8),

    /// String payload is not valid UTF-8
    #[error("Invalid UTF-8 in character string")]
    InvalidUtf8,

    // ===== Frame Errors =====
    /// Frame shorter than the minimal header
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// Frame control flags announce a manufacturer code that is missing
    #[error("Manufacturer-specific frame without manufacturer code")]
    MissingManufacturerCode,

    // ===== Install Code Errors =====
    /// Install code has an unsupported length
    #[error("Invalid install code length: {0} bytes")]
    InvalidInstallCodeLength(usize),

    /// Install code CRC check failed
    #[error("Install code CRC mismatch: expected 0x{expected:04X}, got 0x{got:04X}")]
    InstallCodeCrc {
        /// CRC computed over the code body
        expected: u16,
        /// CRC carried in the final two bytes
        got: u16,
    },

    /// Install code is not valid hex
    #[error("Install code is not valid hex: {0}")]
    InvalidHex(String),
}

impl WireError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            WireError::Underflow { .. } => "UNDERFLOW",
            WireError::UnknownDataType(_) => "UNKNOWN_DATA_TYPE",
            WireError::InvalidUtf8 => "INVALID_UTF8",
            WireError::FrameTooShort(_) => "FRAME_TOO_SHORT",
            WireError::MissingManufacturerCode => "MISSING_MANUFACTURER_CODE",
            WireError::InvalidInstallCodeLength(_) => "INVALID_INSTALL_CODE_LENGTH",
            WireError::InstallCodeCrc { .. } => "INSTALL_CODE_CRC",
            WireError::InvalidHex(_) => "INVALID_HEX",
        }
    }
}

/// Result type alias for wire codec operations
pub type Result<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = WireError::UnknownDataType(0x99);
        assert_eq!(err.error_code(), "UNKNOWN_DATA_TYPE");
        assert!(err.to_string().contains("0x99"));
    }
}
