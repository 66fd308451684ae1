//! Static descriptor table for all known item suffixes
//!
//! Suffix-to-descriptor lookup is a single hash probe into a table built
//! once at startup, which keeps item reads constant-time. New suffixes are
//! added here, never invented at runtime; the bundle loader and cluster
//! handlers both create items strictly from this table.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{CoreError, Result};
use crate::item::{ItemDescriptor, ItemKind};

// Suffix constants, grouped the way the REST projections group them.
pub const ATTR_UNIQUEID: &str = "attr/uniqueid";
pub const ATTR_NAME: &str = "attr/name";
pub const ATTR_MODELID: &str = "attr/modelid";
pub const ATTR_MANUFACTURERNAME: &str = "attr/manufacturername";
pub const ATTR_SWVERSION: &str = "attr/swversion";
pub const ATTR_LASTSEEN: &str = "attr/lastseen";
pub const ATTR_DDF_POLICY: &str = "attr/ddf_policy";
pub const ATTR_DDF_HASH: &str = "attr/ddf_hash";

pub const STATE_ON: &str = "state/on";
pub const STATE_BRI: &str = "state/bri";
pub const STATE_HUE: &str = "state/hue";
pub const STATE_SAT: &str = "state/sat";
pub const STATE_CT: &str = "state/ct";
pub const STATE_X: &str = "state/x";
pub const STATE_Y: &str = "state/y";
pub const STATE_COLORMODE: &str = "state/colormode";
pub const STATE_REACHABLE: &str = "state/reachable";
pub const STATE_TEMPERATURE: &str = "state/temperature";
pub const STATE_HUMIDITY: &str = "state/humidity";
pub const STATE_PRESSURE: &str = "state/pressure";
pub const STATE_PRESENCE: &str = "state/presence";
pub const STATE_OPEN: &str = "state/open";
pub const STATE_ALARM: &str = "state/alarm";
pub const STATE_POWER: &str = "state/power";
pub const STATE_VOLTAGE: &str = "state/voltage";
pub const STATE_CURRENT: &str = "state/current";
pub const STATE_CONSUMPTION: &str = "state/consumption";
pub const STATE_BUTTONEVENT: &str = "state/buttonevent";
pub const STATE_LASTUPDATED: &str = "state/lastupdated";
pub const STATE_SCENE: &str = "state/scene";
pub const STATE_ANY_ON: &str = "state/any_on";
pub const STATE_ALL_ON: &str = "state/all_on";

pub const CONFIG_ON: &str = "config/on";
pub const CONFIG_BATTERY: &str = "config/battery";
pub const CONFIG_OFFSET: &str = "config/offset";
pub const CONFIG_HEATSETPOINT: &str = "config/heatsetpoint";
pub const CONFIG_MODE: &str = "config/mode";
pub const CONFIG_SCHEDULE: &str = "config/schedule";
pub const CONFIG_REACHABLE: &str = "config/reachable";
pub const CONFIG_PERMITJOIN: &str = "config/permitjoin";
pub const CONFIG_CHANNEL: &str = "config/channel";
pub const CONFIG_FWVERSION: &str = "config/fwversion";

pub const ACTION_ON: &str = "action/on";
pub const ACTION_BRI: &str = "action/bri";
pub const ACTION_HUE: &str = "action/hue";
pub const ACTION_SAT: &str = "action/sat";
pub const ACTION_CT: &str = "action/ct";
pub const ACTION_COLORMODE: &str = "action/colormode";
pub const ACTION_SCENE: &str = "action/scene";

macro_rules! descriptor {
    ($suffix:expr, $kind:expr) => {
        descriptor!($suffix, $kind, range: None, public: true, static_item: false,
                    implicit: false, always_fire: false, state_bearing: false)
    };
    ($suffix:expr, $kind:expr, range: $range:expr, public: $public:expr,
     static_item: $static_item:expr, implicit: $implicit:expr,
     always_fire: $always_fire:expr, state_bearing: $state_bearing:expr) => {
        ItemDescriptor {
            suffix: $suffix,
            kind: $kind,
            range: $range,
            public: $public,
            static_item: $static_item,
            implicit: $implicit,
            always_fire: $always_fire,
            state_bearing: $state_bearing,
        }
    };
}

macro_rules! state {
    ($suffix:expr, $kind:expr) => {
        descriptor!($suffix, $kind, range: None, public: true, static_item: false,
                    implicit: false, always_fire: false, state_bearing: true)
    };
    ($suffix:expr, $kind:expr, $min:expr, $max:expr) => {
        descriptor!($suffix, $kind, range: Some(($min, $max)), public: true,
                    static_item: false, implicit: false, always_fire: false,
                    state_bearing: true)
    };
}

static DESCRIPTORS: &[ItemDescriptor] = &[
    // Device attributes
    descriptor!(ATTR_UNIQUEID, ItemKind::String, range: None, public: true,
                static_item: true, implicit: false, always_fire: false, state_bearing: false),
    descriptor!(ATTR_NAME, ItemKind::String),
    descriptor!(ATTR_MODELID, ItemKind::String),
    descriptor!(ATTR_MANUFACTURERNAME, ItemKind::String),
    descriptor!(ATTR_SWVERSION, ItemKind::String),
    descriptor!(ATTR_LASTSEEN, ItemKind::Time),
    descriptor!(ATTR_DDF_POLICY, ItemKind::String),
    descriptor!(ATTR_DDF_HASH, ItemKind::String),
    // Light / sensor state
    state!(STATE_ON, ItemKind::Bool),
    state!(STATE_BRI, ItemKind::U8),
    state!(STATE_HUE, ItemKind::U16),
    state!(STATE_SAT, ItemKind::U8),
    state!(STATE_CT, ItemKind::U16, 153, 500),
    state!(STATE_X, ItemKind::U16),
    state!(STATE_Y, ItemKind::U16),
    state!(STATE_COLORMODE, ItemKind::String),
    descriptor!(STATE_REACHABLE, ItemKind::Bool),
    state!(STATE_TEMPERATURE, ItemKind::I16, -27315, 32767),
    state!(STATE_HUMIDITY, ItemKind::U16, 0, 10000),
    state!(STATE_PRESSURE, ItemKind::I16, 0, 32767),
    state!(STATE_PRESENCE, ItemKind::Bool),
    state!(STATE_OPEN, ItemKind::Bool),
    descriptor!(STATE_ALARM, ItemKind::Bool, range: None, public: true, static_item: false,
                implicit: false, always_fire: true, state_bearing: true),
    state!(STATE_POWER, ItemKind::I32),
    state!(STATE_VOLTAGE, ItemKind::U16),
    state!(STATE_CURRENT, ItemKind::U16),
    state!(STATE_CONSUMPTION, ItemKind::U64),
    descriptor!(STATE_BUTTONEVENT, ItemKind::U32, range: None, public: true,
                static_item: false, implicit: false, always_fire: true, state_bearing: true),
    descriptor!(STATE_LASTUPDATED, ItemKind::Time),
    descriptor!(STATE_SCENE, ItemKind::String, range: None, public: true,
                static_item: false, implicit: false, always_fire: true, state_bearing: false),
    descriptor!(STATE_ANY_ON, ItemKind::Bool),
    descriptor!(STATE_ALL_ON, ItemKind::Bool),
    // Sub-device config
    descriptor!(CONFIG_ON, ItemKind::Bool),
    descriptor!(CONFIG_BATTERY, ItemKind::U8, range: Some((0, 100)), public: true,
                static_item: false, implicit: false, always_fire: false, state_bearing: false),
    descriptor!(CONFIG_OFFSET, ItemKind::I16),
    descriptor!(CONFIG_HEATSETPOINT, ItemKind::I16, range: Some((500, 3200)), public: true,
                static_item: false, implicit: false, always_fire: false, state_bearing: false),
    descriptor!(CONFIG_MODE, ItemKind::String),
    descriptor!(CONFIG_SCHEDULE, ItemKind::String),
    descriptor!(CONFIG_REACHABLE, ItemKind::Bool, range: None, public: false,
                static_item: false, implicit: true, always_fire: false, state_bearing: false),
    // Gateway config
    descriptor!(CONFIG_PERMITJOIN, ItemKind::U16, range: Some((0, 254 * 60)), public: true,
                static_item: false, implicit: false, always_fire: false, state_bearing: false),
    descriptor!(CONFIG_CHANNEL, ItemKind::U8, range: Some((11, 26)), public: true,
                static_item: false, implicit: false, always_fire: false, state_bearing: false),
    descriptor!(CONFIG_FWVERSION, ItemKind::String),
    // Group action
    descriptor!(ACTION_ON, ItemKind::Bool),
    descriptor!(ACTION_BRI, ItemKind::U8),
    descriptor!(ACTION_HUE, ItemKind::U16),
    descriptor!(ACTION_SAT, ItemKind::U8),
    descriptor!(ACTION_CT, ItemKind::U16, range: Some((153, 500)), public: true,
                static_item: false, implicit: false, always_fire: false, state_bearing: false),
    descriptor!(ACTION_COLORMODE, ItemKind::String),
    descriptor!(ACTION_SCENE, ItemKind::String, range: None, public: true,
                static_item: false, implicit: false, always_fire: true, state_bearing: false),
];

static TABLE: Lazy<HashMap<&'static str, &'static ItemDescriptor>> = Lazy::new(|| {
    DESCRIPTORS.iter().map(|d| (d.suffix, d)).collect()
});

/// Look up the descriptor for a suffix.
pub fn descriptor(suffix: &str) -> Result<&'static ItemDescriptor> {
    TABLE
        .get(suffix)
        .copied()
        .ok_or_else(|| CoreError::UnknownSuffix(suffix.to_string()))
}

/// True if the suffix is known to the table.
pub fn is_known_suffix(suffix: &str) -> bool {
    TABLE.contains_key(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let d = descriptor(STATE_TEMPERATURE).unwrap();
        assert_eq!(d.kind, ItemKind::I16);
        assert_eq!(d.range, Some((-27315, 32767)));
        assert!(d.state_bearing);
    }

    #[test]
    fn test_unknown_suffix() {
        assert!(descriptor("state/bogus").is_err());
        assert!(!is_known_suffix("state/bogus"));
    }

    #[test]
    fn test_always_fire_set() {
        assert!(descriptor(STATE_BUTTONEVENT).unwrap().always_fire);
        assert!(descriptor(STATE_SCENE).unwrap().always_fire);
        assert!(!descriptor(STATE_ON).unwrap().always_fire);
    }

    #[test]
    fn test_uniqueid_is_static() {
        assert!(descriptor(ATTR_UNIQUEID).unwrap().static_item);
    }

    #[test]
    fn test_no_duplicate_suffixes() {
        assert_eq!(TABLE.len(), DESCRIPTORS.len());
    }
}
