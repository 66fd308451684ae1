//! Level-control cluster (0x0008): brightness reports

use hive_core::descriptors::STATE_BRI;
use hive_core::ResourceKind;
use hive_wire::AttrRecord;

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0008;

const ATTR_CURRENT_LEVEL: u16 = 0x0000;

pub fn handler() -> ClusterHandler {
    ClusterHandler {
        cluster: CLUSTER,
        attr_target: Some(ResourceKind::Lights),
        command_target: None,
        on_attr,
        on_command: None,
    }
}

fn on_attr(ctx: &mut HandlerCtx<'_>, record: &AttrRecord) {
    if record.attr_id != ATTR_CURRENT_LEVEL {
        return;
    }
    if let Some(v) = ctx.numeric(record) {
        ctx.write_num(STATE_BRI, v);
    }
}
