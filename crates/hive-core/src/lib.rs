//! Hive Core - Resource model of the gateway
//!
//! This crate provides the in-memory resource model shared by every other
//! gateway crate: devices, sub-devices, typed items, groups, scenes and the
//! event bus that announces every observable change.
//!
//! # Modules
//!
//! - [`item`] - Typed items with validation and change detection
//! - [`descriptors`] - The static item descriptor table
//! - [`resource`] - Resource kinds and ordered item bags
//! - [`events`] - The FIFO event bus
//! - [`device`] - Devices, sub-devices and bindings
//! - [`registry`] - Device lifecycle and cascade removal
//! - [`group`] - Groups and the group table
//! - [`scene`] - Scenes and per-light snapshots
//! - [`resourcelinks`] - Named bundles of resource references
//! - [`error`] - Error types and API error codes
//!
//! # Example
//!
//! ```rust
//! use hive_core::events::EventBus;
//! use hive_core::registry::DeviceRegistry;
//!
//! let mut bus = EventBus::new();
//! let mut registry = DeviceRegistry::new();
//! let device = registry.announce(0x0011_2233_4455_6677, 0x1A2B, &mut bus);
//! assert_eq!(device.key_string(), "00:11:22:33:44:55:66:77");
//! ```

pub mod descriptors;
pub mod device;
pub mod error;
pub mod events;
pub mod group;
pub mod item;
pub mod registry;
pub mod resource;
pub mod resourcelinks;
pub mod scene;

pub use device::{Device, DdfPolicy, SubDevice, SubDeviceType};
pub use error::{ApiError, ApiErrorCode, CoreError, Result};
pub use events::{EventBus, EventOp, ResourceEvent};
pub use group::{Group, GroupTable, BROADCAST_GROUP};
pub use item::{Item, ItemValue, SourceTag, ValueUpdate};
pub use registry::DeviceRegistry;
pub use resource::{ItemSet, ResourceKind};
pub use scene::{LightState, Scene};
