//! Resource kinds and the ordered item bag
//!
//! Every addressable thing in the gateway is a set of items under a resource
//! kind. Sub-devices, groups and the gateway config all share `ItemSet`;
//! the kind decides which REST collection the set surfaces in.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::descriptors;
use crate::error::Result;
use crate::events::{EventBus, ResourceEvent};
use crate::item::{Item, ItemValue, SourceTag, ValueUpdate};

/// Resource kinds the event bus and REST boundary distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Devices,
    Lights,
    Sensors,
    Groups,
    Scenes,
    Config,
    ResourceLinks,
}

impl ResourceKind {
    /// REST collection segment for this kind.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Devices => "devices",
            ResourceKind::Lights => "lights",
            ResourceKind::Sensors => "sensors",
            ResourceKind::Groups => "groups",
            ResourceKind::Scenes => "scenes",
            ResourceKind::Config => "config",
            ResourceKind::ResourceLinks => "resourcelinks",
        }
    }
}

/// An ordered bag of items addressed by suffix.
#[derive(Debug, Clone, Default)]
pub struct ItemSet {
    items: Vec<Item>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an item by suffix. The set is a small ordered bag, so a
    /// linear scan is the lookup.
    pub fn item(&self, suffix: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.suffix() == suffix)
    }

    pub fn item_mut(&mut self, suffix: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.suffix() == suffix)
    }

    /// All items in declaration order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// True if the set already holds the suffix.
    pub fn has(&self, suffix: &str) -> bool {
        self.item(suffix).is_some()
    }

    /// Get or create the item for a known suffix.
    pub fn ensure(&mut self, suffix: &str) -> Result<&mut Item> {
        if let Some(pos) = self.items.iter().position(|i| i.suffix() == suffix) {
            return Ok(&mut self.items[pos]);
        }
        let descriptor = descriptors::descriptor(suffix)?;
        self.items.push(Item::new(descriptor));
        Ok(self.items.last_mut().expect("just pushed"))
    }

    /// Insert a pre-built item (bundle loader path). Replaces nothing.
    pub fn add(&mut self, item: Item) {
        if !self.has(item.suffix()) {
            self.items.push(item);
        }
    }

    /// Write a value, creating the item if needed, and enqueue the resource
    /// event when the write changed the value or the suffix is always-fire.
    ///
    /// Exactly one event per accepted changing write; unchanged writes fire
    /// only for always-fire suffixes.
    pub fn set_item(
        &mut self,
        kind: ResourceKind,
        id: &str,
        suffix: &str,
        value: ItemValue,
        source: SourceTag,
        now: DateTime<Utc>,
        bus: &mut EventBus,
    ) -> Result<ValueUpdate> {
        let item = self.ensure(suffix)?;
        let update = item.set_value(value, source, now)?;
        let always_fire = item.descriptor().always_fire;
        if update == ValueUpdate::Changed || always_fire {
            bus.push(ResourceEvent::changed(kind, suffix, id));
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{STATE_BUTTONEVENT, STATE_TEMPERATURE};

    #[test]
    fn test_collection_names() {
        assert_eq!(ResourceKind::Lights.collection(), "lights");
        assert_eq!(ResourceKind::ResourceLinks.collection(), "resourcelinks");
    }

    #[test]
    fn test_set_item_emits_once_per_change() {
        let mut set = ItemSet::new();
        let mut bus = EventBus::new();
        let now = Utc::now();

        set.set_item(
            ResourceKind::Sensors,
            "00:11:22-02-0402",
            STATE_TEMPERATURE,
            ItemValue::Int(2150),
            SourceTag::Parse,
            now,
            &mut bus,
        )
        .unwrap();
        assert_eq!(bus.len(), 1);

        // Same value again: no event.
        set.set_item(
            ResourceKind::Sensors,
            "00:11:22-02-0402",
            STATE_TEMPERATURE,
            ItemValue::Int(2150),
            SourceTag::Parse,
            now,
            &mut bus,
        )
        .unwrap();
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn test_always_fire_emits_on_repeat() {
        let mut set = ItemSet::new();
        let mut bus = EventBus::new();
        let now = Utc::now();

        for _ in 0..2 {
            set.set_item(
                ResourceKind::Sensors,
                "00:11:22-01-0006",
                STATE_BUTTONEVENT,
                ItemValue::Uint(1002),
                SourceTag::Parse,
                now,
                &mut bus,
            )
            .unwrap();
        }
        assert_eq!(bus.len(), 2);
    }

    #[test]
    fn test_rejected_write_emits_nothing() {
        let mut set = ItemSet::new();
        let mut bus = EventBus::new();
        let err = set.set_item(
            ResourceKind::Sensors,
            "x",
            STATE_TEMPERATURE,
            ItemValue::Int(50_000),
            SourceTag::Api,
            Utc::now(),
            &mut bus,
        );
        assert!(err.is_err());
        assert_eq!(bus.len(), 0);
    }

    #[test]
    fn test_items_keep_order() {
        let mut set = ItemSet::new();
        set.ensure("state/on").unwrap();
        set.ensure("state/bri").unwrap();
        set.ensure("state/on").unwrap();
        let suffixes: Vec<_> = set.items().iter().map(|i| i.suffix()).collect();
        assert_eq!(suffixes, vec!["state/on", "state/bri"]);
    }
}
