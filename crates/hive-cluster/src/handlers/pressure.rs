//! Pressure-measurement cluster (0x0403), hectopascal

use hive_core::descriptors::STATE_PRESSURE;
use hive_core::ResourceKind;
use hive_wire::AttrRecord;

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0403;

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
        ctx.write_num(STATE_PRESSURE, v);
    }
}
