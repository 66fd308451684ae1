//! IAS-zone cluster (0x0500): alarm and open/close notifications
//!
//! Zone status arrives as a cluster command, not an attribute report. The
//! alarm item is always-fire; every notification surfaces even when the
//! state repeats.

use hive_core::descriptors::{STATE_ALARM, STATE_OPEN};
use hive_core::{ItemValue, ResourceKind};
use hive_wire::{AttrRecord, Frame, WireReader};

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0500;

const ATTR_ZONE_STATUS: u16 = 0x0002;

const CMD_STATUS_CHANGE_NOTIFICATION: u8 = 0x00;

const ZONE_STATUS_ALARM1: u16 = 0x0001;
const ZONE_STATUS_ALARM2: u16 = 0x0002;

pub fn handler() -> ClusterHandler {
    ClusterHandler {
        cluster: CLUSTER,
        attr_target: Some(ResourceKind::Sensors),
        command_target: Some(ResourceKind::Sensors),
        on_attr,
        on_command: Some(on_command),
    }
}

fn apply_status(ctx: &mut HandlerCtx<'_>, status: u16) {
    let alarm = status & (ZONE_STATUS_ALARM1 | ZONE_STATUS_ALARM2) != 0;
    ctx.write(STATE_ALARM, ItemValue::Bool(alarm));
    // Contact sensors report open/close through alarm1 as well.
    ctx.write(STATE_OPEN, ItemValue::Bool(status & ZONE_STATUS_ALARM1 != 0));
}

fn on_attr(ctx: &mut HandlerCtx<'_>, record: &AttrRecord) {
    if record.attr_id != ATTR_ZONE_STATUS {
        return;
    }
    if let Some(v) = record.value.as_ref().and_then(|v| v.as_f64()) {
        apply_status(ctx, v as u16);
    }
}

fn on_command(ctx: &mut HandlerCtx<'_>, frame: &Frame) {
    if frame.command != CMD_STATUS_CHANGE_NOTIFICATION {
        return;
    }
    let mut r = WireReader::new(&frame.payload);
    let status = r.read_u16();
    if r.ok() {
        apply_status(ctx, status);
    }
}
