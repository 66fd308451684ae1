//! Device registry: exclusive owner of every device object
//!
//! Devices are created on announce, updated on every inbound frame, and
//! removed only by explicit API call. Removal cascades: sub-devices,
//! bindings sourced at the device, and every scene light-state keyed by its
//! light sub-devices go with it. Consumers hold ids, never references, and
//! observe removal through events.

use chrono::Utc;
use tracing::{debug, info};

use crate::device::{Device, SubDevice, SubDeviceType};
use crate::error::{CoreError, Result};
use crate::events::{EventBus, ResourceEvent};
use crate::group::GroupTable;
use crate::resource::ResourceKind;

/// Registry of all devices the gateway has ever seen, keyed by device key.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, key: u64) -> Option<&Device> {
        self.devices.iter().find(|d| d.key() == key)
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.key() == key)
    }

    /// All devices in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.iter_mut()
    }

    /// Get or create a device (announce path). Device keys are unique.
    pub fn announce(&mut self, key: u64, nwk_address: u16, bus: &mut EventBus) -> &mut Device {
        if let Some(pos) = self.devices.iter().position(|d| d.key() == key) {
            let device = &mut self.devices[pos];
            device.seen(nwk_address, Utc::now(), bus);
            return device;
        }
        info!("device announce: key=0x{:016X} nwk=0x{:04X}", key, nwk_address);
        let device = Device::new(key, nwk_address);
        bus.push(ResourceEvent::added(ResourceKind::Devices, &device.key_string()));
        self.devices.push(device);
        self.devices.last_mut().expect("just pushed")
    }

    /// Find the sub-device owning a uniqueid, together with its device key.
    pub fn find_sub_device(&self, uniqueid: &str) -> Option<(u64, &SubDevice)> {
        for device in &self.devices {
            if let Some(sub) = device.sub_devices.iter().find(|s| s.uniqueid() == uniqueid) {
                return Some((device.key(), sub));
            }
        }
        None
    }

    pub fn find_sub_device_mut(&mut self, uniqueid: &str) -> Option<(u64, &mut SubDevice)> {
        for device in &mut self.devices {
            let key = device.key();
            if let Some(sub) = device
                .sub_devices
                .iter_mut()
                .find(|s| s.uniqueid() == uniqueid)
            {
                return Some((key, sub));
            }
        }
        None
    }

    /// Look up a device by the extended address embedded in inbound frames.
    pub fn by_ext_address(&mut self, ext_address: u64) -> Option<&mut Device> {
        self.get_mut(ext_address)
    }

    /// Create a sub-device; the uniqueid must be globally unused.
    pub fn create_sub_device(
        &mut self,
        key: u64,
        endpoint: u8,
        kind: SubDeviceType,
        uniqueid: String,
        bus: &mut EventBus,
    ) -> Result<&mut SubDevice> {
        if self.find_sub_device(&uniqueid).is_some() {
            return Err(CoreError::DuplicateUniqueId(uniqueid));
        }
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.key() == key)
            .ok_or(CoreError::DeviceNotFound(key))?;
        debug!("new sub-device {} on 0x{:016X}", uniqueid, key);
        let sub = SubDevice::new(uniqueid.clone(), endpoint, kind);
        bus.push(ResourceEvent::added(sub.collection(), &uniqueid));
        device.sub_devices.push(sub);
        device.dirty = true;
        Ok(device.sub_devices.last_mut().expect("just pushed"))
    }

    /// Remove a device, cascading into groups and scenes. Returns the
    /// uniqueids of the removed sub-devices.
    pub fn remove_device(
        &mut self,
        key: u64,
        groups: &mut GroupTable,
        bus: &mut EventBus,
    ) -> Result<Vec<String>> {
        let pos = self
            .devices
            .iter()
            .position(|d| d.key() == key)
            .ok_or(CoreError::DeviceNotFound(key))?;
        let device = self.devices.remove(pos);

        let uniqueids: Vec<String> = device
            .sub_devices
            .iter()
            .map(|s| s.uniqueid().to_string())
            .collect();

        // Bindings sourced at the device die with it (they live inside the
        // device object); scene light-states and group memberships are
        // scrubbed here.
        for (sub, uniqueid) in device.sub_devices.iter().zip(&uniqueids) {
            groups.purge_light(uniqueid);
            bus.push(ResourceEvent::deleted(sub.collection(), uniqueid));
        }
        bus.push(ResourceEvent::deleted(ResourceKind::Devices, &device.key_string()));
        info!(
            "device 0x{:016X} removed with {} sub-devices",
            key,
            uniqueids.len()
        );
        Ok(uniqueids)
    }

    /// Devices flagged dirty since the last save.
    pub fn take_dirty(&mut self) -> Vec<u64> {
        let mut keys = Vec::new();
        for device in &mut self.devices {
            if device.dirty {
                device.dirty = false;
                keys.push(device.key());
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LightState, Scene};

    fn setup() -> (DeviceRegistry, GroupTable, EventBus) {
        (DeviceRegistry::new(), GroupTable::new(), EventBus::new())
    }

    #[test]
    fn test_announce_creates_once() {
        let (mut reg, _groups, mut bus) = setup();
        reg.announce(0xAA, 0x0001, &mut bus);
        reg.announce(0xAA, 0x0002, &mut bus);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(0xAA).unwrap().nwk_address, 0x0002);
    }

    #[test]
    fn test_duplicate_uniqueid_rejected() {
        let (mut reg, _groups, mut bus) = setup();
        reg.announce(0xAA, 1, &mut bus);
        reg.announce(0xBB, 2, &mut bus);
        reg.create_sub_device(0xAA, 1, SubDeviceType::Light, "u-1".into(), &mut bus)
            .unwrap();
        let err = reg
            .create_sub_device(0xBB, 1, SubDeviceType::Light, "u-1".into(), &mut bus)
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateUniqueId(_)));
    }

    #[test]
    fn test_remove_device_cascades() {
        let (mut reg, mut groups, mut bus) = setup();
        reg.announce(0xAA, 1, &mut bus);
        reg.create_sub_device(0xAA, 1, SubDeviceType::Light, "u-1".into(), &mut bus)
            .unwrap();

        let group = groups.create(1, "g", &mut bus).unwrap();
        group.add_light("u-1");
        let mut scene = Scene::new(1, "s");
        scene.set_light(LightState::new("u-1"));
        group.add_scene(scene).unwrap();

        bus.drain();
        let removed = reg.remove_device(0xAA, &mut groups, &mut bus).unwrap();
        assert_eq!(removed, vec!["u-1".to_string()]);
        assert!(reg.get(0xAA).is_none());
        assert!(reg.find_sub_device("u-1").is_none());

        let group = groups.get(1).unwrap();
        assert!(!group.has_light("u-1"));
        assert!(group.scene(1).unwrap().lights.is_empty());

        // One deleted event per sub-device plus one for the device.
        let events = bus.drain();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_remove_unknown_device() {
        let (mut reg, mut groups, mut bus) = setup();
        assert!(matches!(
            reg.remove_device(0xDEAD, &mut groups, &mut bus),
            Err(CoreError::DeviceNotFound(0xDEAD))
        ));
    }

    #[test]
    fn test_take_dirty_clears_flags() {
        let (mut reg, _groups, mut bus) = setup();
        reg.announce(0xAA, 1, &mut bus);
        assert_eq!(reg.take_dirty(), vec![0xAA]);
        assert!(reg.take_dirty().is_empty());
    }
}
