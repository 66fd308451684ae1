//! Electrical-measurement cluster (0x0B04): power, voltage, current

use hive_core::descriptors::{STATE_CURRENT, STATE_POWER, STATE_VOLTAGE};
use hive_core::ResourceKind;
use hive_wire::AttrRecord;

use crate::dispatch::{ClusterHandler, HandlerCtx};
use crate::scaling::ATTR_ACTIVE_POWER;

pub const CLUSTER: u16 = 0x0B04;

const ATTR_RMS_VOLTAGE: u16 = 0x0505;
const ATTR_RMS_CURRENT: u16 = 0x0508;

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
        ATTR_ACTIVE_POWER => STATE_POWER,
        ATTR_RMS_VOLTAGE => STATE_VOLTAGE,
        ATTR_RMS_CURRENT => STATE_CURRENT,
        _ => return,
    };
    if let Some(v) = ctx.numeric(record) {
        ctx.write_num(suffix, v);
    }
}
