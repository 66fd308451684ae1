//! Gateway-level config endpoints: key registration, the config object,
//! and the firmware update triggers.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use hive_core::{ApiError, ApiErrorCode};

use crate::gateway::success_entry;
use crate::server::auth::{authorize, error_response, guard_degraded, parse_object};
use crate::server::{publish_events, send_requests};
use crate::AppState;

/// POST /api
pub async fn create_api_key(State(state): State<Arc<AppState>>, body: String) -> Response {
    let body = match parse_object(&body, "/api") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let device_type = body
        .get("devicetype")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let result = state.core.lock().create_api_key(device_type);
    match result {
        Ok(key) => Json(json!([{ "success": { "username": key } }])).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /api/:key/config
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let view = state.core.lock().config_view();
    Json(view).into_response()
}

/// PUT /api/:key/config
pub async fn set_config(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let body = match parse_object(&body, "/config") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // Name and unlock changes stay valid offline; radio-bound fields do not.
    if body.get("permitjoin").is_some() || body.get("channelchange").is_some() {
        if let Err(resp) = guard_degraded(&state, "/config") {
            return resp;
        }
    }
    let result = state.core.lock().set_config(&body);
    match result {
        Ok((responses, requests)) => {
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// DELETE /api/:key/config/whitelist/:target
pub async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    Path((key, target)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.core.lock().delete_api_key(&target);
    if let Err(err) = result {
        return error_response(err);
    }
    if let Err(e) = state.store.delete_auth(&target).await {
        warn!("auth record {} not purged from store: {}", target, e);
    }
    Json(json!([{
        "success": format!("/config/whitelist/{} deleted", target)
    }]))
    .into_response()
}

/// POST /api/:key/config/update
pub async fn check_firmware(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.firmware.lock().start_check();
    match result {
        Ok(()) => {
            Json(json!([success_entry("/config/update", json!("checking"))])).into_response()
        }
        Err(e) => error_response(ApiError::new(
            ApiErrorCode::BridgeBusy,
            "/config/update",
            e.to_string(),
        )),
    }
}

/// POST /api/:key/config/updatefirmware
pub async fn update_firmware(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.firmware.lock().start_update();
    match result {
        Ok(()) => Json(json!([success_entry(
            "/config/updatefirmware",
            json!("updating")
        )]))
        .into_response(),
        Err(e) => error_response(ApiError::new(
            ApiErrorCode::BridgeBusy,
            "/config/updatefirmware",
            e.to_string(),
        )),
    }
}
