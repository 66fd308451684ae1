//! WebSocket frame format tests
//!
//! The feed serializes resource events verbatim; clients depend on the
//! field names and the lowercase kind/op spellings.

use serde_json::Value;

use hive_core::{EventOp, ResourceEvent, ResourceKind};

#[test]
fn test_changed_event_frame() {
    let event = ResourceEvent::changed(
        ResourceKind::Lights,
        "state/on",
        "00:11:22:33:44:55:66:77-01-0006",
    );
    let frame: Value = serde_json::to_value(&event).unwrap();

    assert_eq!(frame["kind"], "lights");
    assert_eq!(frame["suffix"], "state/on");
    assert_eq!(frame["id"], "00:11:22:33:44:55:66:77-01-0006");
    assert_eq!(frame["op"], "changed");
}

#[test]
fn test_added_and_deleted_frames() {
    let added: Value = serde_json::to_value(ResourceEvent::added(ResourceKind::Groups, "4")).unwrap();
    assert_eq!(added["op"], "added");
    assert_eq!(added["id"], "4");
    assert_eq!(added["suffix"], "");

    let deleted: Value =
        serde_json::to_value(ResourceEvent::deleted(ResourceKind::Scenes, "4/2")).unwrap();
    assert_eq!(deleted["op"], "deleted");
    assert_eq!(deleted["kind"], "scenes");
}

#[test]
fn test_notify_frame() {
    let event = ResourceEvent::notify("permit-join-disabled");
    let frame: Value = serde_json::to_value(&event).unwrap();

    assert_eq!(frame["kind"], "config");
    assert_eq!(frame["op"], "notify");
    assert_eq!(frame["suffix"], "permit-join-disabled");
    assert_eq!(frame["id"], "");
}

#[test]
fn test_frame_is_one_json_object_per_event() {
    let event = ResourceEvent::changed(ResourceKind::Config, "attr/name", "");
    let text = serde_json::to_string(&event).unwrap();
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert!(parsed.is_object());
    assert_eq!(parsed.as_object().unwrap().len(), 4);
}

#[test]
fn test_event_op_spellings() {
    assert_eq!(serde_json::to_value(EventOp::Changed).unwrap(), "changed");
    assert_eq!(serde_json::to_value(EventOp::Notify).unwrap(), "notify");
}
