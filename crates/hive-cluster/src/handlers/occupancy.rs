//! Occupancy-sensing cluster (0x0406): presence reports

use hive_core::descriptors::STATE_PRESENCE;
use hive_core::{ItemValue, ResourceKind};
use hive_wire::{AttrRecord, AttrValue};

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0406;

const ATTR_OCCUPANCY: u16 = 0x0000;

pub fn handler() -> ClusterHandler {
    ClusterHandler {
        cluster: CLUSTER,
        attr_target: Some(ResourceKind::Sensors),
        command_target: None,
        on_attr,
        on_command: None,
    }
}

fn on_attr(ctx: &mut HandlerCtx<'_>, record: &AttrRecord) {
    if record.attr_id != ATTR_OCCUPANCY {
        return;
    }
    // Bit 0 of the occupancy bitmap is the occupied flag.
    if let Some(AttrValue::Uint(bits)) = record.value {
        ctx.write(STATE_PRESENCE, ItemValue::Bool(bits & 0x01 != 0));
    }
}
