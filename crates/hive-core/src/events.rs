//! Event bus: single FIFO of resource events
//!
//! The bus is a plain FIFO owned by the main loop. Handlers append to the
//! tail, so a writer observes its own writes on the next drain pass but
//! never within the same pass. Fan-out (WebSocket broadcast, ETag bumps,
//! rules) happens where the loop drains.

use serde::Serialize;
use std::collections::VecDeque;

use crate::resource::ResourceKind;

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOp {
    /// An item value changed (or an always-fire item was written)
    Changed,
    /// A resource was created
    Added,
    /// A resource was removed
    Deleted,
    /// A gateway-level notification (permit-join expiry, degraded mode)
    Notify,
}

/// One event on the bus: `(kind, suffix, id)` plus the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEvent {
    /// Resource collection the event belongs to
    pub kind: ResourceKind,
    /// Item suffix, or a notification tag for `Notify` events
    pub suffix: String,
    /// Sub-device unique id, group address or device key, as a string
    pub id: String,
    /// Operation
    pub op: EventOp,
}

impl ResourceEvent {
    pub fn changed(kind: ResourceKind, suffix: &str, id: &str) -> Self {
        Self { kind, suffix: suffix.to_string(), id: id.to_string(), op: EventOp::Changed }
    }

    pub fn added(kind: ResourceKind, id: &str) -> Self {
        Self { kind, suffix: String::new(), id: id.to_string(), op: EventOp::Added }
    }

    pub fn deleted(kind: ResourceKind, id: &str) -> Self {
        Self { kind, suffix: String::new(), id: id.to_string(), op: EventOp::Deleted }
    }

    /// Gateway notification, e.g. `permit-join-disabled`.
    pub fn notify(tag: &str) -> Self {
        Self {
            kind: ResourceKind::Config,
            suffix: tag.to_string(),
            id: String::new(),
            op: EventOp::Notify,
        }
    }
}

/// Single-threaded FIFO of resource events.
#[derive(Debug, Default)]
pub struct EventBus {
    queue: VecDeque<ResourceEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the tail.
    pub fn push(&mut self, event: ResourceEvent) {
        self.queue.push_back(event);
    }

    /// Pop the oldest event.
    pub fn pop(&mut self) -> Option<ResourceEvent> {
        self.queue.pop_front()
    }

    /// Drain everything queued so far, in FIFO order.
    pub fn drain(&mut self) -> Vec<ResourceEvent> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut bus = EventBus::new();
        bus.push(ResourceEvent::changed(ResourceKind::Lights, "state/on", "a"));
        bus.push(ResourceEvent::changed(ResourceKind::Lights, "state/bri", "a"));
        bus.push(ResourceEvent::deleted(ResourceKind::Groups, "3"));

        let drained = bus.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].suffix, "state/on");
        assert_eq!(drained[1].suffix, "state/bri");
        assert_eq!(drained[2].op, EventOp::Deleted);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_notify_event() {
        let ev = ResourceEvent::notify("permit-join-disabled");
        assert_eq!(ev.kind, ResourceKind::Config);
        assert_eq!(ev.op, EventOp::Notify);
    }
}
