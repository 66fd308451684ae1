//! Inbound frame dispatch
//!
//! One handler per cluster id, looked up in a plain function-pointer table.
//! The dispatcher owns the common path: decode the frame header, find the
//! target sub-device, iterate attribute records, and do the state-bearing
//! bookkeeping (stamp `state/lastupdated`, mark the device dirty). Handlers
//! only map `(cluster, attr, type)` onto item writes.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, trace};

use hive_core::descriptors::{self, STATE_LASTUPDATED};
use hive_core::{DeviceRegistry, EventBus, ItemSet, ItemValue, ResourceKind, SourceTag};
use hive_wire::{AttrRecord, AttrRecordIter, Frame, ProfileCommand, RecordLayout};

use crate::handlers;
use crate::scaling;

/// Inbound data indication as handed over by the host.
#[derive(Debug, Clone)]
pub struct ApsDataIndication {
    /// Application profile id
    pub profile_id: u16,
    /// Cluster id
    pub cluster_id: u16,
    /// Source extended address (device key)
    pub src_ext: u64,
    /// Source short network address
    pub src_nwk: u16,
    /// Source endpoint
    pub src_endpoint: u8,
    /// Raw frame bytes (header + payload)
    pub payload: Vec<u8>,
}

/// Per-record attribute handler.
pub type AttrFn = fn(&mut HandlerCtx<'_>, &AttrRecord);

/// Cluster-specific command handler.
pub type CommandFn = fn(&mut HandlerCtx<'_>, &Frame);

/// One entry of the dispatch table.
pub struct ClusterHandler {
    /// Cluster id the handler serves
    pub cluster: u16,
    /// Collection the attribute path targets; `None` matches any sub-device
    /// on the source endpoint
    pub attr_target: Option<ResourceKind>,
    /// Collection the cluster-command path targets
    pub command_target: Option<ResourceKind>,
    /// Attribute-record handler
    pub on_attr: AttrFn,
    /// Cluster-command handler, absent for attribute-only clusters
    pub on_command: Option<CommandFn>,
}

/// Mutable view a handler writes through.
pub struct HandlerCtx<'a> {
    /// Unique id of the target sub-device
    pub uniqueid: String,
    /// Collection of the target sub-device
    pub kind: ResourceKind,
    /// Model id of the sub-device, empty when not yet read
    pub model_id: String,
    /// Cluster id of the inbound frame
    pub cluster: u16,
    /// Receive timestamp
    pub now: DateTime<Utc>,
    items: &'a mut ItemSet,
    bus: &'a mut EventBus,
    state_touched: bool,
}

impl<'a> HandlerCtx<'a> {
    pub(crate) fn new(
        uniqueid: String,
        kind: ResourceKind,
        model_id: String,
        cluster: u16,
        now: DateTime<Utc>,
        items: &'a mut ItemSet,
        bus: &'a mut EventBus,
    ) -> Self {
        Self { uniqueid, kind, model_id, cluster, now, items, bus, state_touched: false }
    }

    pub(crate) fn state_touched(&self) -> bool {
        self.state_touched
    }

    /// Write one item; state-bearing suffixes flag the sub-device for the
    /// `state/lastupdated` stamp after the frame is fully applied.
    pub fn write(&mut self, suffix: &str, value: ItemValue) {
        let state_bearing = descriptors::descriptor(suffix)
            .map(|d| d.state_bearing)
            .unwrap_or(false);
        match self.items.set_item(
            self.kind,
            &self.uniqueid,
            suffix,
            value,
            SourceTag::Parse,
            self.now,
            self.bus,
        ) {
            Ok(_) => {
                if state_bearing {
                    self.state_touched = true;
                }
            }
            Err(e) => debug!("write {} on {} rejected: {}", suffix, self.uniqueid, e),
        }
    }

    /// Write a numeric item from a pre-scaled value, truncating to the
    /// descriptor's integer shape.
    pub fn write_num(&mut self, suffix: &str, value: f64) {
        use hive_core::item::ItemKind;
        let Ok(desc) = descriptors::descriptor(suffix) else {
            debug!("unknown suffix {}", suffix);
            return;
        };
        let value = match desc.kind {
            ItemKind::Bool => ItemValue::Bool(value != 0.0),
            ItemKind::U8 | ItemKind::U16 | ItemKind::U32 | ItemKind::U64 => {
                ItemValue::Uint(value.max(0.0) as u64)
            }
            ItemKind::I8 | ItemKind::I16 | ItemKind::I32 | ItemKind::I64 => {
                ItemValue::Int(value as i64)
            }
            ItemKind::Double => ItemValue::Double(value),
            ItemKind::String | ItemKind::TimePattern => ItemValue::Str(value.to_string()),
            ItemKind::Time => ItemValue::Time(
                Utc.timestamp_opt(value as i64, 0).single().unwrap_or_default(),
            ),
        };
        self.write(suffix, value);
    }

    /// Numeric view of a record with the model-specific scaling applied.
    pub fn numeric(&self, record: &AttrRecord) -> Option<f64> {
        let raw = record.value.as_ref()?.as_f64()?;
        Some(scaling::apply(&self.model_id, self.cluster, record.attr_id, raw))
    }

    /// Current string value of an item, for handlers that merge (weekly
    /// schedules).
    pub fn current_str(&self, suffix: &str) -> Option<String> {
        self.items
            .item(suffix)
            .and_then(|i| i.value().as_str().map(str::to_owned))
    }
}

/// The dispatch table plus the common inbound path.
pub struct Dispatcher {
    handlers: HashMap<u16, ClusterHandler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// A dispatcher loaded with the built-in cluster handlers.
    pub fn new() -> Self {
        let mut handlers = HashMap::new();
        for handler in handlers::builtin() {
            handlers.insert(handler.cluster, handler);
        }
        Self { handlers }
    }

    /// Apply one inbound indication to the resource model. Unknown devices,
    /// clusters and commands are dropped after a log line; decode underflow
    /// stops record iteration silently.
    pub fn dispatch(
        &self,
        registry: &mut DeviceRegistry,
        bus: &mut EventBus,
        ind: &ApsDataIndication,
    ) {
        let frame = match Frame::decode(&ind.payload) {
            Ok(f) => f,
            Err(e) => {
                info!("dropping malformed frame from 0x{:016X}: {}", ind.src_ext, e);
                return;
            }
        };

        let Some(handler) = self.handlers.get(&ind.cluster_id) else {
            trace!("no handler for cluster 0x{:04X}", ind.cluster_id);
            return;
        };

        let Some(device) = registry.get_mut(ind.src_ext) else {
            debug!(
                "frame from unknown device 0x{:016X} cluster 0x{:04X}, dropped",
                ind.src_ext, ind.cluster_id
            );
            return;
        };
        let now = Utc::now();
        device.seen(ind.src_nwk, now, bus);

        let target = if frame.is_cluster_command() {
            handler.command_target
        } else {
            handler.attr_target
        };
        let Some(sub) = device
            .sub_devices
            .iter_mut()
            .find(|s| s.endpoint == ind.src_endpoint && target.map_or(true, |k| s.collection() == k))
        else {
            debug!(
                "no sub-device for 0x{:016X} ep {} cluster 0x{:04X}",
                ind.src_ext, ind.src_endpoint, ind.cluster_id
            );
            return;
        };

        let model_id = sub
            .items
            .item(descriptors::ATTR_MODELID)
            .and_then(|i| i.value().as_str().map(str::to_owned))
            .unwrap_or_default();
        let mut ctx = HandlerCtx::new(
            sub.uniqueid().to_string(),
            sub.collection(),
            model_id,
            ind.cluster_id,
            now,
            &mut sub.items,
            bus,
        );

        if frame.is_cluster_command() {
            match handler.on_command {
                Some(on_command) => on_command(&mut ctx, &frame),
                None => trace!(
                    "ignoring cluster command 0x{:02X} on 0x{:04X}",
                    frame.command, ind.cluster_id
                ),
            }
        } else {
            let layout = match ProfileCommand::from_id(frame.command) {
                Some(ProfileCommand::ReportAttributes) => RecordLayout::Report,
                Some(ProfileCommand::ReadAttributesResponse) => RecordLayout::ReadResponse,
                _ => {
                    trace!("ignoring profile command 0x{:02X}", frame.command);
                    return;
                }
            };
            for record in AttrRecordIter::new(&frame.payload, layout) {
                match record {
                    Ok(record) if record.value.is_some() => (handler.on_attr)(&mut ctx, &record),
                    Ok(_) => {} // failed read-response record, no value
                    Err(e) => {
                        info!("attribute record decode stopped: {}", e);
                        break;
                    }
                }
            }
        }

        if ctx.state_touched() {
            let uniqueid = ctx.uniqueid.clone();
            let kind = ctx.kind;
            let _ = ctx.items.set_item(
                kind,
                &uniqueid,
                STATE_LASTUPDATED,
                ItemValue::Time(now),
                SourceTag::Internal,
                now,
                ctx.bus,
            );
            device.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::device::SubDeviceType;
    use hive_core::descriptors::{ATTR_MODELID, STATE_POWER, STATE_TEMPERATURE};
    use hive_wire::FrameBuilder;

    const CLUSTER_TEMPERATURE: u16 = 0x0402;

    fn report_frame(build: impl FnOnce(&mut hive_wire::WireWriter)) -> Vec<u8> {
        FrameBuilder::new(1, hive_wire::commands::CMD_REPORT_ATTRIBUTES)
            .server_to_client()
            .disable_default_response()
            .payload(build)
            .build()
            .encode()
    }

    fn setup(kind: SubDeviceType, uniqueid: &str) -> (DeviceRegistry, EventBus) {
        let mut bus = EventBus::new();
        let mut registry = DeviceRegistry::new();
        registry.announce(0xAA, 0x1234, &mut bus);
        registry
            .create_sub_device(0xAA, 1, kind, uniqueid.into(), &mut bus)
            .unwrap();
        bus.drain();
        (registry, bus)
    }

    fn indication(cluster_id: u16, payload: Vec<u8>) -> ApsDataIndication {
        ApsDataIndication {
            profile_id: 0x0104,
            cluster_id,
            src_ext: 0xAA,
            src_nwk: 0x1234,
            src_endpoint: 1,
            payload,
        }
    }

    #[test]
    fn test_temperature_report_writes_item() {
        let (mut registry, mut bus) = setup(SubDeviceType::TemperatureSensor, "u-1");
        let payload = report_frame(|w| {
            w.write_u16(0x0000);
            w.write_u8(0x29); // i16
            w.write_i16(2150);
        });
        let dispatcher = Dispatcher::new();
        dispatcher.dispatch(&mut registry, &mut bus, &indication(CLUSTER_TEMPERATURE, payload));

        let (_, sub) = registry.find_sub_device("u-1").unwrap();
        assert_eq!(
            sub.items.item(STATE_TEMPERATURE).unwrap().value(),
            &ItemValue::Int(2150)
        );
        assert!(sub.items.has(STATE_LASTUPDATED));
        // attr/lastseen + state/temperature + state/lastupdated
        let events = bus.drain();
        assert_eq!(events.len(), 3);
        assert!(registry.get(0xAA).unwrap().dirty);
    }

    #[test]
    fn test_sp120_power_scaled() {
        let (mut registry, mut bus) = setup(SubDeviceType::Consumption, "u-1");
        {
            let (_, sub) = registry.find_sub_device_mut("u-1").unwrap();
            sub.items
                .set_item(
                    ResourceKind::Sensors,
                    "u-1",
                    ATTR_MODELID,
                    ItemValue::Str("SP 120".into()),
                    SourceTag::Parse,
                    Utc::now(),
                    &mut bus,
                )
                .unwrap();
        }
        bus.drain();
        let payload = report_frame(|w| {
            w.write_u16(scaling::ATTR_ACTIVE_POWER);
            w.write_u8(0x29); // i16
            w.write_i16(273);
        });
        let dispatcher = Dispatcher::new();
        dispatcher.dispatch(
            &mut registry,
            &mut bus,
            &indication(scaling::CLUSTER_POWER_MEASUREMENT, payload),
        );

        let (_, sub) = registry.find_sub_device("u-1").unwrap();
        assert_eq!(sub.items.item(STATE_POWER).unwrap().value(), &ItemValue::Int(27));
        let events = bus.drain();
        let suffixes: Vec<_> = events.iter().map(|e| e.suffix.as_str()).collect();
        assert!(suffixes.contains(&STATE_POWER));
        assert!(suffixes.contains(&STATE_LASTUPDATED));
    }

    #[test]
    fn test_unknown_device_dropped() {
        let mut registry = DeviceRegistry::new();
        let mut bus = EventBus::new();
        let payload = report_frame(|w| {
            w.write_u16(0x0000);
            w.write_u8(0x29);
            w.write_i16(1);
        });
        Dispatcher::new().dispatch(&mut registry, &mut bus, &indication(CLUSTER_TEMPERATURE, payload));
        assert!(registry.is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn test_truncated_record_partial_apply() {
        let (mut registry, mut bus) = setup(SubDeviceType::TemperatureSensor, "u-1");
        let payload = report_frame(|w| {
            w.write_u16(0x0000);
            w.write_u8(0x29);
            w.write_i16(2000);
            // Second record is cut short after the attr id.
            w.write_u8(0x01);
        });
        Dispatcher::new().dispatch(&mut registry, &mut bus, &indication(CLUSTER_TEMPERATURE, payload));
        let (_, sub) = registry.find_sub_device("u-1").unwrap();
        assert_eq!(
            sub.items.item(STATE_TEMPERATURE).unwrap().value(),
            &ItemValue::Int(2000)
        );
    }
}
