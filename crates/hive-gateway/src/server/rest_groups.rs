//! Group, scene and resourcelink endpoints.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use hive_core::{ApiError, ApiErrorCode};

use crate::server::auth::{authorize, error_response, guard_degraded, parse_object};
use crate::server::{publish_events, send_requests};
use crate::AppState;

/// GET /api/:key/groups
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let view = state.core.lock().groups_view();
    Json(view).into_response()
}

/// POST /api/:key/groups
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let body = match parse_object(&body, "/groups") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(name) = body.get("name").and_then(Value::as_str) else {
        return error_response(ApiError::new(
            ApiErrorCode::MissingParameter,
            "/groups",
            "missing parameters in body",
        ));
    };
    let result = state.core.lock().create_group(name);
    match result {
        Ok(gid) => {
            publish_events(&state);
            Json(json!([{ "success": { "id": gid.to_string() } }])).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// GET /api/:key/groups/:gid
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path((key, gid)): Path<(String, u16)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let view = state.core.lock().group_view(gid);
    match view {
        Ok(v) => Json(v).into_response(),
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/groups/:gid
pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Path((key, gid)): Path<(String, u16)>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/groups/{}", gid);
    let body = match parse_object(&body, &address) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // Membership changes go out over the air.
    if body.get("lights").is_some() {
        if let Err(resp) = guard_degraded(&state, &address) {
            return resp;
        }
    }
    let result = state.core.lock().update_group(gid, &body);
    match result {
        Ok((responses, requests)) => {
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// DELETE /api/:key/groups/:gid
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path((key, gid)): Path<(String, u16)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.core.lock().delete_group(gid);
    match result {
        Ok(requests) => {
            if let Err(e) = state.store.delete_group(gid).await {
                warn!("group {} not purged from store: {}", gid, e);
            }
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(json!([{ "success": format!("/groups/{} deleted", gid) }])).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/groups/:gid/action
pub async fn group_action(
    State(state): State<Arc<AppState>>,
    Path((key, gid)): Path<(String, u16)>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/groups/{}/action", gid);
    if let Err(resp) = guard_degraded(&state, &address) {
        return resp;
    }
    let body = match parse_object(&body, &address) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = state.core.lock().group_action(gid, &body);
    match result {
        Ok((responses, requests)) => {
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// POST /api/:key/groups/:gid/scenes
pub async fn create_scene(
    State(state): State<Arc<AppState>>,
    Path((key, gid)): Path<(String, u16)>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/groups/{}/scenes", gid);
    if let Err(resp) = guard_degraded(&state, &address) {
        return resp;
    }
    let body = match parse_object(&body, &address) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(name) = body.get("name").and_then(Value::as_str) else {
        return error_response(ApiError::new(
            ApiErrorCode::MissingParameter,
            address,
            "missing parameters in body",
        ));
    };
    let result = state.core.lock().create_scene(gid, name);
    match result {
        Ok((_sid, responses, requests)) => {
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/groups/:gid/scenes/:sid/store
pub async fn store_scene(
    State(state): State<Arc<AppState>>,
    Path((key, gid, sid)): Path<(String, u16, u8)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/groups/{}/scenes/{}/store", gid, sid);
    if let Err(resp) = guard_degraded(&state, &address) {
        return resp;
    }
    let result = state.core.lock().store_scene(gid, sid);
    match result {
        Ok((responses, requests)) => {
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/groups/:gid/scenes/:sid/recall
pub async fn recall_scene(
    State(state): State<Arc<AppState>>,
    Path((key, gid, sid)): Path<(String, u16, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/groups/{}/scenes/{}/recall", gid, sid);
    if let Err(resp) = guard_degraded(&state, &address) {
        return resp;
    }
    let result = state.core.lock().recall_scene(gid, &sid);
    match result {
        Ok((responses, requests)) => {
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/groups/:gid/scenes/:sid/lights/:uid/state
pub async fn modify_scene_light(
    State(state): State<Arc<AppState>>,
    Path((key, gid, sid, uid)): Path<(String, u16, u8, String)>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/groups/{}/scenes/{}/lights/{}/state", gid, sid, uid);
    let body = match parse_object(&body, &address) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = state.core.lock().modify_scene_light(gid, sid, &uid, &body);
    match result {
        Ok(responses) => Json(Value::Array(responses)).into_response(),
        Err(err) => error_response(err),
    }
}

/// DELETE /api/:key/groups/:gid/scenes/:sid
pub async fn delete_scene(
    State(state): State<Arc<AppState>>,
    Path((key, gid, sid)): Path<(String, u16, u8)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.core.lock().delete_scene(gid, sid);
    match result {
        Ok(requests) => {
            if let Err(e) = state.store.delete_scene(gid, sid).await {
                warn!("scene {}/{} not purged from store: {}", gid, sid, e);
            }
            send_requests(&state, requests).await;
            publish_events(&state);
            Json(json!([{
                "success": format!("/groups/{}/scenes/{} deleted", gid, sid)
            }]))
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// GET /api/:key/resourcelinks
pub async fn list_resource_links(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let view = state.core.lock().resource_links_view();
    Json(view).into_response()
}

/// POST /api/:key/resourcelinks
pub async fn create_resource_link(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let body = match parse_object(&body, "/resourcelinks") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = state.core.lock().create_resource_link(&body, &key);
    match result {
        Ok(id) => {
            publish_events(&state);
            Json(json!([{ "success": { "id": id.to_string() } }])).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// PUT /api/:key/resourcelinks/:id
pub async fn update_resource_link(
    State(state): State<Arc<AppState>>,
    Path((key, id)): Path<(String, u16)>,
    body: String,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/resourcelinks/{}", id);
    let body = match parse_object(&body, &address) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = state.core.lock().update_resource_link(id, &body);
    match result {
        Ok(responses) => {
            publish_events(&state);
            Json(Value::Array(responses)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// DELETE /api/:key/resourcelinks/:id
pub async fn delete_resource_link(
    State(state): State<Arc<AppState>>,
    Path((key, id)): Path<(String, u16)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let result = state.core.lock().delete_resource_link(id);
    match result {
        Ok(()) => {
            if let Err(e) = state.store.delete_resource_link(id).await {
                warn!("resourcelink {} not purged from store: {}", id, e);
            }
            publish_events(&state);
            Json(json!([{ "success": format!("/resourcelinks/{} deleted", id) }]))
                .into_response()
        }
        Err(err) => error_response(err),
    }
}
