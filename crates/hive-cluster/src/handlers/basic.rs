//! Basic cluster (0x0000): device identity attributes

use hive_core::descriptors::{ATTR_MANUFACTURERNAME, ATTR_MODELID, ATTR_SWVERSION};
use hive_core::ItemValue;
use hive_wire::{AttrRecord, AttrValue};

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0000;

const ATTR_MANUFACTURER_NAME: u16 = 0x0004;
const ATTR_MODEL_IDENTIFIER: u16 = 0x0005;
const ATTR_SW_BUILD_ID: u16 = 0x4000;

pub fn handler() -> ClusterHandler {
    ClusterHandler {
        cluster: CLUSTER,
        attr_target: None,
        command_target: None,
        on_attr,
        on_command: None,
    }
}

fn on_attr(ctx: &mut HandlerCtx<'_>, record: &AttrRecord) {
    let Some(AttrValue::Str(s)) = &record.value else {
        return;
    };
    let suffix = match record.attr_id {
        ATTR_MANUFACTURER_NAME => ATTR_MANUFACTURERNAME,
        ATTR_MODEL_IDENTIFIER => ATTR_MODELID,
        ATTR_SW_BUILD_ID => ATTR_SWVERSION,
        _ => return,
    };
    ctx.write(suffix, ItemValue::Str(s.clone()));
}
