//! Request-side plumbing shared by the REST handlers: key checks, the
//! degraded-mode gate, body parsing, and the error-list response shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use hive_core::{ApiError, ApiErrorCode};

use crate::AppState;

/// Map a numeric error code onto the HTTP status of the response.
pub fn status_for(code: u16) -> StatusCode {
    match code {
        1 => StatusCode::FORBIDDEN,
        3 | 4 => StatusCode::NOT_FOUND,
        950 | 951 => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Serialize one error entry as the whole response list.
pub fn error_response(err: ApiError) -> Response {
    let status = status_for(err.code);
    (status, Json(json!([{ "error": err }]))).into_response()
}

/// Check the key against the whitelist and stamp its last-used time.
pub fn authorize(state: &AppState, key: &str) -> Result<(), Response> {
    let mut core = state.core.lock();
    if !core.is_authorized(key) {
        return Err(error_response(ApiError::unauthorized()));
    }
    core.touch_key(key);
    Ok(())
}

/// Refuse radio-bound writes while the host link is silent.
pub fn guard_degraded(state: &AppState, address: &str) -> Result<(), Response> {
    if state.core.lock().watchdog.is_degraded() {
        return Err(error_response(ApiError::new(
            ApiErrorCode::NotConnected,
            address,
            "bridge not connected",
        )));
    }
    Ok(())
}

/// Parse a request body that must be a JSON object.
pub fn parse_object(raw: &str, address: &str) -> Result<Value, Response> {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) if v.is_object() => Ok(v),
        _ => Err(error_response(ApiError::new(
            ApiErrorCode::InvalidJson,
            address,
            "body contains invalid JSON",
        ))),
    }
}
