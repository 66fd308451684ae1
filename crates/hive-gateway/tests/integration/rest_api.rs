//! REST API response-format tests
//!
//! These tests verify the response shapes the API contracts promise:
//! resource maps on GET, success/error entry lists on writes.

use serde_json::{json, Value};

use hive_core::{ApiError, ApiErrorCode};

/// Test expected format for GET /api/:key/config response
#[test]
fn test_config_response_format() {
    let response = json!({
        "name": "hive-gateway",
        "apiversion": "1.16.0",
        "swversion": "0.1.0",
        "channel": 11,
        "permitjoin": 0,
        "networkupdateid": 0,
        "devicecount": 3,
        "degraded": false
    });

    assert!(response["name"].is_string());
    assert!(response["channel"].is_number());
    assert!(response["permitjoin"].is_number());
    assert!(response["degraded"].is_boolean());
}

/// Test expected format for a write success list
#[test]
fn test_success_list_format() {
    let response = json!([
        { "success": { "/groups/2/action/bri": 200 } },
        { "success": { "/groups/2/action/on": true } }
    ]);

    assert!(response.is_array());
    for entry in response.as_array().unwrap() {
        let body = entry["success"].as_object().unwrap();
        assert_eq!(body.len(), 1);
        let addr = body.keys().next().unwrap();
        assert!(addr.starts_with('/'));
    }
}

/// Error entries carry the numeric code under "type"
#[test]
fn test_error_entry_format() {
    let err = ApiError::not_available("/groups/99");
    let entry = json!([{ "error": err }]);

    assert_eq!(entry[0]["error"]["type"], 3);
    assert_eq!(entry[0]["error"]["address"], "/groups/99");
    assert_eq!(
        entry[0]["error"]["description"],
        "resource, /groups/99, not available"
    );
}

/// Unauthorized entries always point at the root address
#[test]
fn test_unauthorized_entry_format() {
    let err = ApiError::unauthorized();
    let v = serde_json::to_value(&err).unwrap();
    assert_eq!(v["type"], 1);
    assert_eq!(v["address"], "/");
    assert_eq!(v["description"], "unauthorized user");
}

/// Key registration returns the new key under success/username
#[test]
fn test_create_key_response_format() {
    let response = json!([{ "success": { "username": "A1B2C3D4E5F60718" } }]);
    let key = response[0]["success"]["username"].as_str().unwrap();
    assert_eq!(key.len(), 16);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
}

/// Test expected format for GET /api/:key/devices response
#[test]
fn test_devices_list_format() {
    let response = json!([
        "00:11:22:33:44:55:66:77",
        "00:11:22:33:44:55:66:88"
    ]);

    for key in response.as_array().unwrap() {
        let key = key.as_str().unwrap();
        assert_eq!(key.len(), 23);
        assert_eq!(key.split(':').count(), 8);
    }
}

/// Test expected format for a device DDF view
#[test]
fn test_device_ddf_format() {
    let response = json!({
        "policy": "latest_prefer_stable",
        "hash": "ab".repeat(32),
        "file_hash": "cd".repeat(32),
        "descriptor": {
            "manufacturername": "Acme",
            "modelid": "bulb-1",
            "schema": "devcap1.schema.json"
        }
    });

    assert!(response["policy"].is_string());
    assert_eq!(response["hash"].as_str().unwrap().len(), 64);
}

/// Invalid-value descriptions follow the fixed grammar
#[test]
fn test_invalid_value_description_grammar() {
    let err = ApiError::invalid_value("/config/channelchange", 42);
    assert_eq!(err.code, ApiErrorCode::InvalidValue.code());
    assert_eq!(
        err.description,
        "invalid value, 42, for parameter, /config/channelchange"
    );
}
