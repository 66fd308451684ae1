//! REST and WebSocket surface of the gateway
//!
//! All routes live under `/api`; everything except key creation and the
//! WebSocket upgrade is keyed. Handlers lock the core, perform the
//! operation, then release the lock before any radio or disk await.

pub mod auth;
pub mod rest_config;
pub mod rest_ddf;
pub mod rest_devices;
pub mod rest_groups;
pub mod websocket;

use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use hive_cluster::{ApsRequest, HostLink};

use crate::AppState;

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Key registration
        .route("/api", post(rest_config::create_api_key))
        // Gateway config
        .route(
            "/api/:key/config",
            get(rest_config::get_config).put(rest_config::set_config),
        )
        .route(
            "/api/:key/config/whitelist/:target",
            delete(rest_config::delete_api_key),
        )
        .route("/api/:key/config/update", post(rest_config::check_firmware))
        .route(
            "/api/:key/config/updatefirmware",
            post(rest_config::update_firmware),
        )
        // Devices
        .route("/api/:key/devices", get(rest_devices::list_devices))
        .route(
            "/api/:key/devices/:device",
            get(rest_devices::get_device).delete(rest_devices::delete_device),
        )
        .route("/api/:key/devices/:device/ddf", get(rest_devices::get_device_ddf))
        .route(
            "/api/:key/devices/:device/ddf/policy",
            put(rest_devices::set_ddf_policy),
        )
        .route(
            "/api/:key/devices/:device/ddf/reload",
            put(rest_devices::reload_ddf),
        )
        .route(
            "/api/:key/devices/:device/installcode",
            put(rest_devices::set_install_code),
        )
        // Groups and scenes
        .route(
            "/api/:key/groups",
            get(rest_groups::list_groups).post(rest_groups::create_group),
        )
        .route(
            "/api/:key/groups/:gid",
            get(rest_groups::get_group)
                .put(rest_groups::update_group)
                .delete(rest_groups::delete_group),
        )
        .route("/api/:key/groups/:gid/action", put(rest_groups::group_action))
        .route("/api/:key/groups/:gid/scenes", post(rest_groups::create_scene))
        .route(
            "/api/:key/groups/:gid/scenes/:sid",
            delete(rest_groups::delete_scene),
        )
        .route(
            "/api/:key/groups/:gid/scenes/:sid/store",
            put(rest_groups::store_scene),
        )
        .route(
            "/api/:key/groups/:gid/scenes/:sid/recall",
            put(rest_groups::recall_scene),
        )
        .route(
            "/api/:key/groups/:gid/scenes/:sid/lights/:uid/state",
            put(rest_groups::modify_scene_light),
        )
        // Resourcelinks
        .route(
            "/api/:key/resourcelinks",
            get(rest_groups::list_resource_links).post(rest_groups::create_resource_link),
        )
        .route(
            "/api/:key/resourcelinks/:id",
            put(rest_groups::update_resource_link).delete(rest_groups::delete_resource_link),
        )
        // Description bundles
        .route("/api/:key/ddf/descriptors", get(rest_ddf::list_descriptors))
        .route("/api/:key/ddf/bundles", post(rest_ddf::upload_bundle))
        .route("/api/:key/ddf/bundles/:hash", get(rest_ddf::download_bundle))
        // WebSocket endpoint
        .route("/ws", get(websocket::ws_handler))
        // CORS for browser clients
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Hand queued requests to the host link.
pub async fn send_requests(state: &AppState, requests: Vec<ApsRequest>) {
    for req in requests {
        let aps_req_id = req.aps_req_id;
        if let Err(e) = state.host.aps_request(req).await {
            warn!("request {} dropped: {}", aps_req_id, e);
        }
    }
}

/// Fan freshly queued resource events out to the WebSocket clients.
pub fn publish_events(state: &AppState) {
    for event in state.core.lock().drain_events() {
        let _ = state.event_tx.send(event);
    }
}
