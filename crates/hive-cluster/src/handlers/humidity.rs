//! Relative-humidity cluster (0x0405), hundredths of a percent

use hive_core::descriptors::STATE_HUMIDITY;
use hive_core::ResourceKind;
use hive_wire::AttrRecord;

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0405;

const ATTR_MEASURED_VALUE: u16 = 0x0000;

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
    if record.attr_id != ATTR_MEASURED_VALUE {
        return;
    }
    if let Some(v) = ctx.numeric(record) {
        ctx.write_num(STATE_HUMIDITY, v);
    }
}
