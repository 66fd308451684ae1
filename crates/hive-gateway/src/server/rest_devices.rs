//! Device endpoints: listing, the per-device view, deletion, the
//! description-bundle policy surface, and install codes.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::server::auth::{authorize, error_response, guard_degraded, parse_object};
use crate::server::publish_events;
use crate::AppState;

/// GET /api/:key/devices
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let view = state.core.lock().devices_view();
    Json(view).into_response()
}

/// GET /api/:key/devices/:device
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path((key, device)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let view = state.core.lock().device_view(&device);
    match view {
        Ok(v) => Json(v).into_response(),
        Err(err) => error_response(err),
    }
}

/// DELETE /api/:key/devices/:device
pub async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path((key, device)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.core.lock().delete_device(&device);
    match result {
        Ok(device_key) => {
            if let Err(e) = state.store.delete_device(&device_key).await {
                warn!("device {} not purged from store: {}", device_key, e);
            }
            publish_events(&state);
            Json(json!([{
                "success": format!("/devices/{} deleted", device)
            }]))
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// GET /api/:key/devices/:device/ddf
pub async fn get_device_ddf(
    State(state): State<Arc<AppState>>,
    Path((key, device)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let view = state.core.lock().device_ddf(&device);
    match view {
        Ok(v) => Json(v).into_response(),
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/devices/:device/ddf/policy
pub async fn set_ddf_policy(
    State(state): State<Arc<AppState>>,
    Path((key, device)): Path<(String, String)>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/devices/{}/ddf/policy", device);
    let body = match parse_object(&body, &address) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = state.core.lock().set_ddf_policy(&device, &body);
    match result {
        Ok(responses) => {
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/devices/:device/ddf/reload
pub async fn reload_ddf(
    State(state): State<Arc<AppState>>,
    Path((key, device)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.core.lock().reload_ddf(&device);
    match result {
        Ok(responses) => Json(Value::Array(responses)).into_response(),
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/devices/:device/installcode
pub async fn set_install_code(
    State(state): State<Arc<AppState>>,
    Path((key, device)): Path<(String, String)>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/devices/{}/installcode", device);
    if let Err(resp) = guard_degraded(&state, &address) {
        return resp;
    }
    let body = match parse_object(&body, &address) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = state.core.lock().set_install_code(&device, &body);
    match result {
        Ok(responses) => Json(Value::Array(responses)).into_response(),
        Err(err) => error_response(err),
    }
}
