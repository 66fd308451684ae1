//! Resourcelinks: named bundles of resource references
//!
//! A resourcelink groups arbitrary resource paths (lights, sensors, groups,
//! scenes) under one id so clients can treat them as a unit. The gateway
//! only stores and serves them; it never dereferences the paths.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::events::{EventBus, ResourceEvent};
use crate::resource::ResourceKind;

/// One resourcelink record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLink {
    /// Numeric id, unique in the table
    pub id: u16,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Client-chosen class id
    #[serde(default)]
    pub classid: u16,
    /// API key of the creator
    #[serde(default)]
    pub owner: String,
    /// Recycled automatically when unreferenced
    #[serde(default)]
    pub recycle: bool,
    /// Referenced resource paths, e.g. `/groups/2`
    #[serde(default)]
    pub links: Vec<String>,
}

impl ResourceLink {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            classid: 0,
            owner: String::new(),
            recycle: false,
            links: Vec::new(),
        }
    }
}

/// Table of resourcelinks, keyed by id.
#[derive(Debug, Default)]
pub struct ResourceLinkTable {
    links: Vec<ResourceLink>,
}

impl ResourceLinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u16) -> Option<&ResourceLink> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut ResourceLink> {
        self.links.iter_mut().find(|l| l.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceLink> {
        self.links.iter()
    }

    /// Insert a record with the next free id.
    pub fn create(&mut self, mut link: ResourceLink, bus: &mut EventBus) -> u16 {
        let id = (1..).find(|id| self.get(*id).is_none()).unwrap_or(0);
        link.id = id;
        bus.push(ResourceEvent::added(ResourceKind::ResourceLinks, &id.to_string()));
        self.links.push(link);
        id
    }

    pub fn delete(&mut self, id: u16, bus: &mut EventBus) -> Result<ResourceLink> {
        let pos = self
            .links
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| CoreError::InvalidValue(format!("resourcelink {id} not found")))?;
        bus.push(ResourceEvent::deleted(ResourceKind::ResourceLinks, &id.to_string()));
        Ok(self.links.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_assigns_free_id() {
        let mut bus = EventBus::new();
        let mut table = ResourceLinkTable::new();
        let a = table.create(ResourceLink::new(0, "a"), &mut bus);
        let b = table.create(ResourceLink::new(0, "b"), &mut bus);
        assert_ne!(a, b);
        table.delete(a, &mut bus).unwrap();
        let c = table.create(ResourceLink::new(0, "c"), &mut bus);
        assert_eq!(c, a);
    }

    #[test]
    fn test_delete_missing() {
        let mut bus = EventBus::new();
        let mut table = ResourceLinkTable::new();
        assert!(table.delete(9, &mut bus).is_err());
    }
}
