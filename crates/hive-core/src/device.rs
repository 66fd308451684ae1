//! Devices and sub-devices
//!
//! A device is a physical node keyed by its 64-bit extended hardware
//! address. Its logically independent feature sets (one button of a
//! multi-gang switch, the light behind endpoint 1) are sub-devices, each an
//! ordered item bag with a globally unique, immutable `attr/uniqueid`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::descriptors::{ATTR_DDF_HASH, ATTR_DDF_POLICY, ATTR_LASTSEEN, ATTR_UNIQUEID};
use crate::error::{CoreError, Result};
use crate::events::EventBus;
use crate::item::{ItemValue, SourceTag};
use crate::resource::{ItemSet, ResourceKind};

/// Which bundle applies to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdfPolicy {
    /// Highest-version matching bundle, `stable` status preferred
    #[default]
    LatestPreferStable,
    /// Highest-version match regardless of status
    Latest,
    /// Exactly the bundle pinned in `attr/ddf_hash`
    Pin,
    /// Descriptor read from a free-form JSON file
    RawJson,
}

impl DdfPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DdfPolicy::LatestPreferStable => "latest_prefer_stable",
            DdfPolicy::Latest => "latest",
            DdfPolicy::Pin => "pin",
            DdfPolicy::RawJson => "raw_json",
        }
    }
}

impl fmt::Display for DdfPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DdfPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latest_prefer_stable" => Ok(DdfPolicy::LatestPreferStable),
            "latest" => Ok(DdfPolicy::Latest),
            "pin" => Ok(DdfPolicy::Pin),
            "raw_json" => Ok(DdfPolicy::RawJson),
            other => Err(CoreError::InvalidValue(format!("unknown ddf policy: {other}"))),
        }
    }
}

/// Type tag of a sub-device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubDeviceType {
    Light,
    Thermostat,
    Switch,
    TemperatureSensor,
    HumiditySensor,
    PressureSensor,
    PresenceSensor,
    OpenCloseSensor,
    PowerOutlet,
    Consumption,
    Alarm,
}

impl SubDeviceType {
    /// REST collection the sub-device surfaces in.
    pub fn kind(self) -> ResourceKind {
        match self {
            SubDeviceType::Light | SubDeviceType::PowerOutlet => ResourceKind::Lights,
            _ => ResourceKind::Sensors,
        }
    }
}

/// A logically independent feature set on one device.
#[derive(Debug, Clone)]
pub struct SubDevice {
    /// Globally unique, immutable identifier
    uniqueid: String,
    /// Source endpoint on the device
    pub endpoint: u8,
    /// Type tag
    pub kind: SubDeviceType,
    /// Ordered item bag
    pub items: ItemSet,
}

impl SubDevice {
    pub fn new(uniqueid: String, endpoint: u8, kind: SubDeviceType) -> Self {
        let mut items = ItemSet::new();
        if let Ok(item) = items.ensure(ATTR_UNIQUEID) {
            // First write of a static item is the construction-time value.
            let _ = item.set_value(
                ItemValue::Str(uniqueid.clone()),
                SourceTag::Internal,
                Utc::now(),
            );
        }
        Self { uniqueid, endpoint, kind, items }
    }

    pub fn uniqueid(&self) -> &str {
        &self.uniqueid
    }

    /// REST collection this sub-device belongs to.
    pub fn collection(&self) -> ResourceKind {
        self.kind.kind()
    }
}

/// One binding record: which reports the device sends unsolicited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    /// Source endpoint on the device
    pub src_endpoint: u8,
    /// Source cluster
    pub cluster: u16,
    /// Destination
    pub destination: BindingDestination,
}

/// Binding destination: a unicast endpoint or a group address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingDestination {
    /// Extended address + destination endpoint
    Endpoint { ext_address: u64, endpoint: u8 },
    /// 16-bit group address
    Group(u16),
}

/// Node-descriptor capability bits reported at join time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    /// Mains powered (vs battery/sleeper)
    pub mains_powered: bool,
    /// Full-function router (vs end device)
    pub router: bool,
    /// Receiver stays on while idle
    pub rx_on_when_idle: bool,
}

/// A physical node on the mesh.
#[derive(Debug, Clone)]
pub struct Device {
    /// 64-bit device key (extended hardware address)
    key: u64,
    /// Short network address, updated on every inbound frame
    pub nwk_address: u16,
    /// Node-descriptor capability bits
    pub capabilities: NodeCapabilities,
    /// Sub-devices in creation order
    pub sub_devices: Vec<SubDevice>,
    /// Binding records whose source is this device
    pub bindings: Vec<BindingRecord>,
    /// Device-level attribute items (ddf_policy, ddf_hash, lastseen, ...)
    pub items: ItemSet,
    /// Remaining scene-table capacity
    pub scene_capacity: u8,
    /// Consecutive failed requests; drives quarantine
    pub failed_requests: u8,
    /// Needs a persistence save
    pub dirty: bool,
}

/// Scene-table capacity a fresh device advertises.
pub const DEFAULT_SCENE_CAPACITY: u8 = 16;

/// Failed requests after which a device is quarantined.
pub const QUARANTINE_THRESHOLD: u8 = 10;

impl Device {
    pub fn new(key: u64, nwk_address: u16) -> Self {
        let mut items = ItemSet::new();
        let now = Utc::now();
        if let Ok(item) = items.ensure(ATTR_DDF_POLICY) {
            let _ = item.set_value(
                ItemValue::Str(DdfPolicy::default().as_str().to_string()),
                SourceTag::Internal,
                now,
            );
        }
        if let Ok(item) = items.ensure(ATTR_DDF_HASH) {
            let _ = item.set_value(ItemValue::Str(String::new()), SourceTag::Internal, now);
        }
        if let Ok(item) = items.ensure(ATTR_LASTSEEN) {
            let _ = item.set_value(ItemValue::Time(now), SourceTag::Internal, now);
        }
        Self {
            key,
            nwk_address,
            capabilities: NodeCapabilities::default(),
            sub_devices: Vec::new(),
            bindings: Vec::new(),
            items,
            scene_capacity: DEFAULT_SCENE_CAPACITY,
            failed_requests: 0,
            dirty: true,
        }
    }

    /// 64-bit device key.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Device key formatted the way uniqueids embed it.
    pub fn key_string(&self) -> String {
        let b = self.key.to_be_bytes();
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }

    /// Current DDF policy from the mandatory item.
    pub fn ddf_policy(&self) -> DdfPolicy {
        self.items
            .item(ATTR_DDF_POLICY)
            .and_then(|i| i.value().as_str().map(str::to_owned))
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Pinned DDF hash, empty when unset.
    pub fn ddf_hash(&self) -> String {
        self.items
            .item(ATTR_DDF_HASH)
            .and_then(|i| i.value().as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    /// Stamp `attr/lastseen` and refresh the short address; called on every
    /// inbound frame.
    pub fn seen(&mut self, nwk_address: u16, now: DateTime<Utc>, bus: &mut EventBus) {
        self.nwk_address = nwk_address;
        self.failed_requests = 0;
        let id = self.key_string();
        let _ = self.items.set_item(
            ResourceKind::Devices,
            &id,
            ATTR_LASTSEEN,
            ItemValue::Time(now),
            SourceTag::Internal,
            now,
            bus,
        );
    }

    /// Find a sub-device by endpoint and type.
    pub fn sub_device(&self, endpoint: u8, kind: SubDeviceType) -> Option<&SubDevice> {
        self.sub_devices
            .iter()
            .find(|s| s.endpoint == endpoint && s.kind == kind)
    }

    pub fn sub_device_mut(&mut self, endpoint: u8, kind: SubDeviceType) -> Option<&mut SubDevice> {
        self.sub_devices
            .iter_mut()
            .find(|s| s.endpoint == endpoint && s.kind == kind)
    }

    /// Build the uniqueid for an endpoint/cluster pair on this device.
    pub fn uniqueid_for(&self, endpoint: u8, cluster: u16) -> String {
        format!("{}-{:02x}-{:04x}", self.key_string(), endpoint, cluster)
    }

    /// Record a failed request; returns true once the quarantine threshold
    /// is crossed.
    pub fn record_failure(&mut self) -> bool {
        self.failed_requests = self.failed_requests.saturating_add(1);
        self.failed_requests == QUARANTINE_THRESHOLD
    }

    pub fn is_quarantined(&self) -> bool {
        self.failed_requests >= QUARANTINE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_roundtrip() {
        for policy in [
            DdfPolicy::LatestPreferStable,
            DdfPolicy::Latest,
            DdfPolicy::Pin,
            DdfPolicy::RawJson,
        ] {
            assert_eq!(policy.as_str().parse::<DdfPolicy>().unwrap(), policy);
        }
        assert!("bogus".parse::<DdfPolicy>().is_err());
    }

    #[test]
    fn test_new_device_has_mandatory_items() {
        let dev = Device::new(0x0011_2233_4455_6677, 0x1234);
        assert!(dev.items.has(ATTR_DDF_POLICY));
        assert!(dev.items.has(ATTR_DDF_HASH));
        assert!(dev.items.has(ATTR_LASTSEEN));
        assert_eq!(dev.ddf_policy(), DdfPolicy::LatestPreferStable);
    }

    #[test]
    fn test_key_string() {
        let dev = Device::new(0x0011_2233_4455_6677, 0);
        assert_eq!(dev.key_string(), "00:11:22:33:44:55:66:77");
        assert_eq!(
            dev.uniqueid_for(2, 0x0402),
            "00:11:22:33:44:55:66:77-02-0402"
        );
    }

    #[test]
    fn test_seen_resets_failures() {
        let mut dev = Device::new(1, 0);
        let mut bus = EventBus::new();
        for _ in 0..QUARANTINE_THRESHOLD {
            dev.record_failure();
        }
        assert!(dev.is_quarantined());
        dev.seen(0x4455, Utc::now(), &mut bus);
        assert!(!dev.is_quarantined());
        assert_eq!(dev.nwk_address, 0x4455);
    }

    #[test]
    fn test_subdevice_uniqueid_item() {
        let sub = SubDevice::new("00:11-01-0006".into(), 1, SubDeviceType::Light);
        assert_eq!(
            sub.items.item(ATTR_UNIQUEID).unwrap().value(),
            &ItemValue::Str("00:11-01-0006".into())
        );
        assert_eq!(sub.collection(), ResourceKind::Lights);
    }
}
