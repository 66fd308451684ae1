//! Error types for the resource model and the REST error-code table
//!
//! Two tiers live here: `CoreError` is what model operations return inside
//! the process, and `ApiError` is the numeric-coded entry the REST boundary
//! serializes into response lists.

use serde::Serialize;
use thiserror::Error;

/// Main error type for resource-model operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===== Item Errors =====
    /// Suffix has no descriptor in the static table
    #[error("Unknown item suffix: {0}")]
    UnknownSuffix(String),

    /// Value does not match the item descriptor's type
    #[error("Type mismatch for {suffix}: expected {expected}")]
    TypeMismatch {
        /// Item suffix
        suffix: String,
        /// Expected type name
        expected: &'static str,
    },

    /// Value is outside the descriptor's validity range
    #[error("Value out of range for {suffix}: {value} not in [{min}, {max}]")]
    OutOfRange {
        /// Item suffix
        suffix: String,
        /// Offending value
        value: i64,
        /// Range lower bound
        min: i64,
        /// Range upper bound
        max: i64,
    },

    /// Item is declared static and cannot be rewritten
    #[error("Item {0} is static")]
    StaticItem(String),

    // ===== Registry Errors =====
    /// Device not present in the registry
    #[error("Device not found: 0x{0:016X}")]
    DeviceNotFound(u64),

    /// No sub-device with the given unique id
    #[error("Sub-device not found: {0}")]
    SubDeviceNotFound(String),

    /// Unique id already claimed by another sub-device
    #[error("Unique id already exists: {0}")]
    DuplicateUniqueId(String),

    // ===== Group & Scene Errors =====
    /// Group not present
    #[error("Group not found: {0}")]
    GroupNotFound(u16),

    /// Group address 0 is the broadcast group and owns no scenes
    #[error("Group 0 is reserved")]
    ReservedGroup,

    /// Scene not present in the group
    #[error("Scene not found: group {group} scene {scene}")]
    SceneNotFound {
        /// Group address
        group: u16,
        /// Scene id
        scene: u8,
    },

    /// Scene id already used in this group
    #[error("Scene id {scene} already exists in group {group}")]
    DuplicateScene {
        /// Group address
        group: u16,
        /// Scene id
        scene: u8,
    },

    /// Device scene table exhausted
    #[error("Scene capacity exhausted for device 0x{0:016X}")]
    SceneCapacityExhausted(u64),

    // ===== General Errors =====
    /// Invalid value supplied through the API
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Get an error code for logging/metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::UnknownSuffix(_) => "UNKNOWN_SUFFIX",
            CoreError::TypeMismatch { .. } => "TYPE_MISMATCH",
            CoreError::OutOfRange { .. } => "OUT_OF_RANGE",
            CoreError::StaticItem(_) => "STATIC_ITEM",
            CoreError::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            CoreError::SubDeviceNotFound(_) => "SUBDEVICE_NOT_FOUND",
            CoreError::DuplicateUniqueId(_) => "DUPLICATE_UNIQUEID",
            CoreError::GroupNotFound(_) => "GROUP_NOT_FOUND",
            CoreError::ReservedGroup => "RESERVED_GROUP",
            CoreError::SceneNotFound { .. } => "SCENE_NOT_FOUND",
            CoreError::DuplicateScene { .. } => "DUPLICATE_SCENE",
            CoreError::SceneCapacityExhausted(_) => "SCENE_CAPACITY_EXHAUSTED",
            CoreError::InvalidValue(_) => "INVALID_VALUE",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for resource-model operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Numeric error codes of the REST surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u16)]
pub enum ApiErrorCode {
    UnauthorizedUser = 1,
    InvalidJson = 2,
    ResourceNotAvailable = 3,
    MethodNotAvailable = 4,
    MissingParameter = 5,
    ParameterNotAvailable = 6,
    InvalidValue = 7,
    ParameterNotModifiable = 8,
    TooManyItems = 11,
    DuplicateExist = 100,
    DeviceOff = 201,
    DeviceNotReachable = 202,
    BridgeGroupTableFull = 301,
    DeviceGroupTableFull = 302,
    DeviceScenesTableFull = 402,
    InvalidDdfBundle = 403,
    NotConnected = 950,
    BridgeBusy = 951,
}

impl ApiErrorCode {
    /// Numeric code as carried in the response body.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// One error entry of a REST response list.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Numeric error code
    #[serde(rename = "type")]
    pub code: u16,
    /// Resource address the error refers to
    pub address: String,
    /// Human-readable description
    pub description: String,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, address: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            address: address.into(),
            description: description.into(),
        }
    }

    /// Standard "resource, /path, not available" entry.
    pub fn not_available(address: impl Into<String>) -> Self {
        let address = address.into();
        let description = format!("resource, {}, not available", address);
        Self::new(ApiErrorCode::ResourceNotAvailable, address, description)
    }

    /// Standard invalid-value entry for a parameter.
    pub fn invalid_value(address: impl Into<String>, value: impl std::fmt::Display) -> Self {
        let address = address.into();
        let description = format!("invalid value, {}, for parameter, {}", value, address);
        Self::new(ApiErrorCode::InvalidValue, address, description)
    }

    /// Standard unauthorized entry.
    pub fn unauthorized() -> Self {
        Self::new(ApiErrorCode::UnauthorizedUser, "/", "unauthorized user")
    }
}

impl From<&CoreError> for ApiErrorCode {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::UnknownSuffix(_) | CoreError::SubDeviceNotFound(_) => {
                ApiErrorCode::ResourceNotAvailable
            }
            CoreError::TypeMismatch { .. }
            | CoreError::OutOfRange { .. }
            | CoreError::InvalidValue(_) => ApiErrorCode::InvalidValue,
            CoreError::StaticItem(_) => ApiErrorCode::ParameterNotModifiable,
            CoreError::DeviceNotFound(_)
            | CoreError::GroupNotFound(_)
            | CoreError::SceneNotFound { .. } => ApiErrorCode::ResourceNotAvailable,
            CoreError::ReservedGroup => ApiErrorCode::InvalidValue,
            CoreError::DuplicateUniqueId(_) | CoreError::DuplicateScene { .. } => {
                ApiErrorCode::DuplicateExist
            }
            CoreError::SceneCapacityExhausted(_) => ApiErrorCode::DeviceScenesTableFull,
            CoreError::Internal(_) => ApiErrorCode::BridgeBusy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CoreError::GroupNotFound(7);
        assert_eq!(err.error_code(), "GROUP_NOT_FOUND");
        assert_eq!(ApiErrorCode::from(&err), ApiErrorCode::ResourceNotAvailable);
    }

    #[test]
    fn test_api_error_serializes_type_field() {
        let entry = ApiError::invalid_value("/devices/x/ddf/policy/hash", "zzz");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], 7);
        assert!(json["description"].as_str().unwrap().contains("invalid value"));
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!(ApiErrorCode::UnauthorizedUser.code(), 1);
        assert_eq!(ApiErrorCode::DeviceScenesTableFull.code(), 402);
        assert_eq!(ApiErrorCode::NotConnected.code(), 950);
    }
}
