//! Simple-metering cluster (0x0702): consumption and instantaneous demand

use hive_core::descriptors::{STATE_CONSUMPTION, STATE_POWER};
use hive_core::ResourceKind;
use hive_wire::AttrRecord;

use crate::dispatch::{ClusterHandler, HandlerCtx};
use crate::scaling::ATTR_CURRENT_SUMMATION;

pub const CLUSTER: u16 = 0x0702;

const ATTR_INSTANTANEOUS_DEMAND: u16 = 0x0400;

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
    let suffix = match record.attr_id {
        ATTR_CURRENT_SUMMATION => STATE_CONSUMPTION,
        ATTR_INSTANTANEOUS_DEMAND => STATE_POWER,
        _ => return,
    };
    if let Some(v) = ctx.numeric(record) {
        ctx.write_num(suffix, v);
    }
}
