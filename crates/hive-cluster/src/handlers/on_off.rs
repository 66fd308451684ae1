//! On/off cluster (0x0006)
//!
//! Server reports feed `state/on` on lights; client-side cluster commands
//! from switches become button events (always-fire, every press surfaces).

use hive_core::descriptors::{STATE_BUTTONEVENT, STATE_ON};
use hive_core::{ItemValue, ResourceKind};
use hive_wire::{AttrRecord, AttrValue, Frame};

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0006;

const ATTR_ON_OFF: u16 = 0x0000;

const CMD_OFF: u8 = 0x00;
const CMD_ON: u8 = 0x01;
const CMD_TOGGLE: u8 = 0x02;

/// Button-event encoding: `1000 * button + action`, action 2 = short press.
const BUTTON_1_PRESS: u64 = 1002;
const BUTTON_2_PRESS: u64 = 2002;
const BUTTON_3_PRESS: u64 = 3002;

pub fn handler() -> ClusterHandler {
    ClusterHandler {
        cluster: CLUSTER,
        attr_target: Some(ResourceKind::Lights),
        command_target: Some(ResourceKind::Sensors),
        on_attr,
        on_command: Some(on_command),
    }
}

fn on_attr(ctx: &mut HandlerCtx<'_>, record: &AttrRecord) {
    if record.attr_id != ATTR_ON_OFF {
        return;
    }
    if let Some(AttrValue::Bool(on)) = record.value {
        ctx.write(STATE_ON, ItemValue::Bool(on));
    }
}

fn on_command(ctx: &mut HandlerCtx<'_>, frame: &Frame) {
    let event = match frame.command {
        CMD_ON => BUTTON_1_PRESS,
        CMD_OFF => BUTTON_2_PRESS,
        CMD_TOGGLE => BUTTON_3_PRESS,
        _ => return,
    };
    ctx.write(STATE_BUTTONEVENT, ItemValue::Uint(event));
}
