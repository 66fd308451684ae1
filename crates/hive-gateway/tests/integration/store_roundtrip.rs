//! Store round trips as the handlers drive them: delete endpoints cascade
//! through the SQLite layer.

use serde_json::json;
use tempfile::TempDir;

use hive_state::{AuthRecord, DeviceRecord, ItemRecord, SqliteStore, SubDeviceRecord};

async fn store(dir: &TempDir) -> SqliteStore {
    SqliteStore::new(dir.path().join("gateway.db")).await.unwrap()
}

#[tokio::test]
async fn test_auth_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;

    store
        .save_auth(&AuthRecord {
            api_key: "A1B2C3D4E5F60718".to_string(),
            device_type: "test#client".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_used: "2026-01-01T00:00:00Z".to_string(),
        })
        .await
        .unwrap();

    let records = store.load_auth().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].device_type, "test#client");

    store.delete_auth("A1B2C3D4E5F60718").await.unwrap();
    assert!(store.load_auth().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_device_delete_cascades() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;

    let key = "00:11:22:33:44:55:66:77";
    let uniqueid = "00:11:22:33:44:55:66:77-01-0006";
    store
        .save_device(&DeviceRecord {
            key: key.to_string(),
            nwk: 0x1234,
            data: json!({ "scene_capacity": 16 }),
        })
        .await
        .unwrap();
    store
        .save_sub_device(&SubDeviceRecord {
            uniqueid: uniqueid.to_string(),
            device_key: key.to_string(),
            endpoint: 1,
            kind: "Light".to_string(),
        })
        .await
        .unwrap();
    store
        .save_item(&ItemRecord {
            uniqueid: uniqueid.to_string(),
            suffix: "state/on".to_string(),
            value: json!(true),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        })
        .await
        .unwrap();

    store.delete_device(key).await.unwrap();

    assert!(store.load_devices().await.unwrap().is_empty());
    assert!(store.load_sub_devices().await.unwrap().is_empty());
    assert!(store.load_items(uniqueid).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_group_delete_cascades_scenes() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;

    store.save_group(4, &json!({ "name": "Porch" })).await.unwrap();
    store
        .save_scene(4, 1, &json!({ "id": 1, "name": "Evening" }))
        .await
        .unwrap();

    store.delete_group(4).await.unwrap();

    assert!(store.load_groups().await.unwrap().is_empty());
    assert!(store.load_scenes(4).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scene_delete_leaves_group() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;

    store.save_group(2, &json!({ "name": "Hall" })).await.unwrap();
    store.save_scene(2, 1, &json!({ "id": 1 })).await.unwrap();
    store.save_scene(2, 2, &json!({ "id": 2 })).await.unwrap();

    store.delete_scene(2, 1).await.unwrap();

    let scenes = store.load_scenes(2).await.unwrap();
    assert_eq!(scenes.len(), 1);
    assert_eq!(scenes[0].0, 2);
    assert_eq!(store.load_groups().await.unwrap().len(), 1);
}
