//! Description-bundle endpoints: enumeration, upload, download.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use hive_core::{ApiError, ApiErrorCode};
use hive_ddf::BundleHash;

use crate::server::auth::{authorize, error_response};
use crate::AppState;

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

/// GET /api/:key/ddf/descriptors
pub async fn list_descriptors(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let page = state.core.lock().bundles.list(query.offset, limit);
    match page {
        Ok(page) => {
            let mut descriptors = serde_json::Map::new();
            for entry in &page.entries {
                descriptors.insert(
                    entry.hash.to_hex(),
                    json!({
                        "file_hash": entry.file_hash.to_hex(),
                        "descriptor": &entry.descriptor,
                    }),
                );
            }
            Json(json!({
                "descriptors": descriptors,
                "total": page.total,
                "next": page.next_offset,
            }))
            .into_response()
        }
        Err(e) => error_response(ApiError::new(
            ApiErrorCode::BridgeBusy,
            "/ddf/descriptors",
            e.to_string(),
        )),
    }
}

/// POST /api/:key/ddf/bundles (multipart/form-data, first file part)
pub async fn upload_bundle(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    mut multipart: Multipart,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let data = match multipart.next_field().await {
        Ok(Some(field)) => match field.bytes().await {
            Ok(bytes) => bytes,
            Err(_) => {
                return error_response(ApiError::new(
                    ApiErrorCode::InvalidDdfBundle,
                    "/ddf/bundles",
                    "truncated upload",
                ))
            }
        },
        _ => {
            return error_response(ApiError::new(
                ApiErrorCode::MissingParameter,
                "/ddf/bundles",
                "missing file part",
            ))
        }
    };
    let stored = state.core.lock().bundles.store(&data);
    match stored {
        Ok(hash) => {
            info!("bundle {} uploaded ({} bytes)", hash.to_hex(), data.len());
            Json(json!([{ "success": { "id": hash.to_hex() } }])).into_response()
        }
        Err(e) if e.is_validation() => error_response(ApiError::new(
            ApiErrorCode::InvalidDdfBundle,
            "/ddf/bundles",
            e.to_string(),
        )),
        Err(e) => error_response(ApiError::new(
            ApiErrorCode::BridgeBusy,
            "/ddf/bundles",
            e.to_string(),
        )),
    }
}

/// GET /api/:key/ddf/bundles/:hash
pub async fn download_bundle(
    State(state): State<Arc<AppState>>,
    Path((key, hash)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&state, &key) {
        return resp;
    }
    let address = format!("/ddf/bundles/{}", hash);
    let Ok(hash) = BundleHash::from_hex(&hash) else {
        return error_response(ApiError::not_available(address));
    };
    let data = state.core.lock().bundles.load(&hash);
    match data {
        Ok(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data,
        )
            .into_response(),
        Err(_) => error_response(ApiError::not_available(address)),
    }
}
