//! Groups and the group table
//!
//! A group is a 16-bit multicast address owning an ordered list of member
//! lights and an ordered list of scenes. Cross-references are stored as ids
//! only; the registry owns the actual objects. Deleting a group leaves a
//! tombstone until the persistence layer has observed it, then purges.

use tracing::debug;

use crate::descriptors::STATE_SCENE;
use crate::error::{CoreError, Result};
use crate::events::{EventBus, ResourceEvent};
use crate::item::{ItemValue, SourceTag};
use crate::resource::{ItemSet, ResourceKind};
use crate::scene::Scene;

/// Reserved broadcast group address.
pub const BROADCAST_GROUP: u16 = 0;

/// A multicast group with member lights and scenes.
#[derive(Debug, Clone)]
pub struct Group {
    /// 16-bit group address
    id: u16,
    /// Display name
    pub name: String,
    /// Ordered member light uniqueids
    pub lights: Vec<String>,
    /// Ordered scenes
    pub scenes: Vec<Scene>,
    /// Switch sub-devices that "own" this group
    pub member_refs: Vec<String>,
    /// Action and state items (action/on, state/any_on, state/scene, ...)
    pub items: ItemSet,
    /// Tombstone: deleted but not yet purged
    pub deleted: bool,
}

impl Group {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            lights: Vec::new(),
            scenes: Vec::new(),
            member_refs: Vec::new(),
            items: ItemSet::new(),
            deleted: false,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn scene(&self, scene_id: u8) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == scene_id)
    }

    pub fn scene_mut(&mut self, scene_id: u8) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == scene_id)
    }

    /// Add a scene; scene ids are unique inside a group.
    pub fn add_scene(&mut self, scene: Scene) -> Result<()> {
        if self.id == BROADCAST_GROUP {
            return Err(CoreError::ReservedGroup);
        }
        if self.scene(scene.id).is_some() {
            return Err(CoreError::DuplicateScene { group: self.id, scene: scene.id });
        }
        self.scenes.push(scene);
        Ok(())
    }

    /// Remove a scene by id.
    pub fn remove_scene(&mut self, scene_id: u8) -> Result<Scene> {
        let pos = self
            .scenes
            .iter()
            .position(|s| s.id == scene_id)
            .ok_or(CoreError::SceneNotFound { group: self.id, scene: scene_id })?;
        Ok(self.scenes.remove(pos))
    }

    /// True if the light is a member.
    pub fn has_light(&self, uniqueid: &str) -> bool {
        self.lights.iter().any(|l| l == uniqueid)
    }

    /// Join a light; no-op if already a member.
    pub fn add_light(&mut self, uniqueid: &str) {
        if !self.has_light(uniqueid) {
            self.lights.push(uniqueid.to_string());
        }
    }

    /// Leave a light: drops the membership and every scene snapshot that
    /// was keyed by it.
    pub fn remove_light(&mut self, uniqueid: &str) -> bool {
        let was_member = self.has_light(uniqueid);
        self.lights.retain(|l| l != uniqueid);
        for scene in &mut self.scenes {
            scene.remove_light(uniqueid);
        }
        was_member
    }

    /// Currently recalled scene id, if any.
    pub fn current_scene(&self) -> Option<u8> {
        self.items
            .item(STATE_SCENE)
            .and_then(|i| i.value().as_str().map(str::to_owned))
            .and_then(|s| s.parse().ok())
    }

    /// Stamp the current-scene item; always fires an event.
    pub fn set_current_scene(&mut self, scene_id: u8, bus: &mut EventBus) {
        let id = self.id.to_string();
        let _ = self.items.set_item(
            ResourceKind::Groups,
            &id,
            STATE_SCENE,
            ItemValue::Str(scene_id.to_string()),
            SourceTag::Internal,
            chrono::Utc::now(),
            bus,
        );
    }

    /// Resolve a scene id that may be the literal `next` / `prev` pseudo-id,
    /// relative to the current scene and wrapping at the list ends.
    pub fn resolve_scene_id(&self, sid: &str) -> Result<u8> {
        if self.scenes.is_empty() {
            return Err(CoreError::SceneNotFound { group: self.id, scene: 0 });
        }
        match sid {
            "next" | "prev" => {
                let pos = self
                    .current_scene()
                    .and_then(|cur| self.scenes.iter().position(|s| s.id == cur));
                let n = self.scenes.len();
                let idx = match (sid, pos) {
                    ("next", Some(p)) => (p + 1) % n,
                    ("prev", Some(p)) => (p + n - 1) % n,
                    // No current scene: next starts at the head, prev at the tail.
                    ("next", None) => 0,
                    _ => n - 1,
                };
                Ok(self.scenes[idx].id)
            }
            _ => {
                let parsed: u8 = sid
                    .parse()
                    .map_err(|_| CoreError::InvalidValue(format!("invalid scene id: {sid}")))?;
                if self.scene(parsed).is_none() {
                    return Err(CoreError::SceneNotFound { group: self.id, scene: parsed });
                }
                Ok(parsed)
            }
        }
    }
}

/// Table of all groups, keyed by address.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: Vec<Group>,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u16) -> Option<&Group> {
        self.groups.iter().find(|g| g.id() == id && !g.deleted)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id() == id && !g.deleted)
    }

    /// All live groups in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|g| !g.deleted)
    }

    /// Create a group; the address must be unused.
    pub fn create(&mut self, id: u16, name: impl Into<String>, bus: &mut EventBus) -> Result<&mut Group> {
        if self.groups.iter().any(|g| g.id() == id) {
            return Err(CoreError::InvalidValue(format!("group {id} already exists")));
        }
        self.groups.push(Group::new(id, name));
        bus.push(ResourceEvent::added(ResourceKind::Groups, &id.to_string()));
        Ok(self.groups.last_mut().expect("just pushed"))
    }

    /// Mark a group deleted (tombstone retained until purged).
    pub fn delete(&mut self, id: u16, bus: &mut EventBus) -> Result<()> {
        if id == BROADCAST_GROUP {
            return Err(CoreError::ReservedGroup);
        }
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.id() == id && !g.deleted)
            .ok_or(CoreError::GroupNotFound(id))?;
        group.deleted = true;
        bus.push(ResourceEvent::deleted(ResourceKind::Groups, &id.to_string()));
        debug!("group {} tombstoned", id);
        Ok(())
    }

    /// Drop tombstoned groups once persistence has observed them.
    pub fn purge_deleted(&mut self) -> usize {
        let before = self.groups.len();
        self.groups.retain(|g| !g.deleted);
        before - self.groups.len()
    }

    /// Remove a light from every group and every scene (cascade path on
    /// device removal).
    pub fn purge_light(&mut self, uniqueid: &str) {
        for group in &mut self.groups {
            group.remove_light(uniqueid);
            group.member_refs.retain(|m| m != uniqueid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::LightState;

    fn table_with_group() -> (GroupTable, EventBus) {
        let mut bus = EventBus::new();
        let mut table = GroupTable::new();
        table.create(1, "Living room", &mut bus).unwrap();
        (table, bus)
    }

    #[test]
    fn test_no_scene_on_broadcast_group() {
        let mut group = Group::new(BROADCAST_GROUP, "all");
        assert!(matches!(
            group.add_scene(Scene::new(1, "x")),
            Err(CoreError::ReservedGroup)
        ));
    }

    #[test]
    fn test_scene_ids_unique() {
        let mut group = Group::new(1, "g");
        group.add_scene(Scene::new(1, "a")).unwrap();
        assert!(matches!(
            group.add_scene(Scene::new(1, "b")),
            Err(CoreError::DuplicateScene { .. })
        ));
    }

    #[test]
    fn test_remove_light_scrubs_scenes() {
        let mut group = Group::new(1, "g");
        group.add_light("light-a");
        let mut scene = Scene::new(1, "s");
        scene.set_light(LightState::new("light-a"));
        group.add_scene(scene).unwrap();

        assert!(group.remove_light("light-a"));
        assert!(group.scene(1).unwrap().lights.is_empty());
    }

    #[test]
    fn test_next_prev_wrap() {
        let mut bus = EventBus::new();
        let mut group = Group::new(1, "g");
        for id in [1, 2, 5] {
            group.add_scene(Scene::new(id, format!("s{id}"))).unwrap();
        }
        group.set_current_scene(5, &mut bus);
        assert_eq!(group.resolve_scene_id("next").unwrap(), 1);
        group.set_current_scene(1, &mut bus);
        assert_eq!(group.resolve_scene_id("prev").unwrap(), 5);
        assert_eq!(group.resolve_scene_id("2").unwrap(), 2);
        assert!(group.resolve_scene_id("9").is_err());
        assert!(group.resolve_scene_id("bogus").is_err());
    }

    #[test]
    fn test_tombstone_then_purge() {
        let (mut table, mut bus) = table_with_group();
        table.delete(1, &mut bus).unwrap();
        assert!(table.get(1).is_none());
        // Address still occupied until purge.
        assert!(table.create(1, "again", &mut bus).is_err());
        assert_eq!(table.purge_deleted(), 1);
        assert!(table.create(1, "again", &mut bus).is_ok());
    }

    #[test]
    fn test_delete_broadcast_group_rejected() {
        let (mut table, mut bus) = table_with_group();
        assert!(matches!(
            table.delete(BROADCAST_GROUP, &mut bus),
            Err(CoreError::ReservedGroup)
        ));
    }

    #[test]
    fn test_purge_light_everywhere() {
        let (mut table, mut bus) = table_with_group();
        table.create(2, "Kitchen", &mut bus).unwrap();
        for id in [1, 2] {
            let g = table.get_mut(id).unwrap();
            g.add_light("light-a");
            let mut scene = Scene::new(1, "s");
            scene.set_light(LightState::new("light-a"));
            g.add_scene(scene).unwrap();
        }
        table.purge_light("light-a");
        for id in [1, 2] {
            let g = table.get(id).unwrap();
            assert!(!g.has_light("light-a"));
            assert!(g.scene(1).unwrap().lights.is_empty());
        }
    }
}
