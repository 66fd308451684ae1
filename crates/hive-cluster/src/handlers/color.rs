//! Color-control cluster (0x0300): hue/sat, xy and color temperature

use hive_core::descriptors::{STATE_COLORMODE, STATE_CT, STATE_HUE, STATE_SAT, STATE_X, STATE_Y};
use hive_core::{ItemValue, ResourceKind};
use hive_wire::{AttrRecord, AttrValue};

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0300;

const ATTR_CURRENT_HUE: u16 = 0x0000;
const ATTR_CURRENT_SAT: u16 = 0x0001;
const ATTR_CURRENT_X: u16 = 0x0003;
const ATTR_CURRENT_Y: u16 = 0x0004;
const ATTR_COLOR_TEMPERATURE: u16 = 0x0007;
const ATTR_COLOR_MODE: u16 = 0x0008;

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
    match record.attr_id {
        ATTR_CURRENT_HUE => {
            if let Some(v) = ctx.numeric(record) {
                // 8-bit hue scaled onto the 16-bit item range.
                ctx.write_num(STATE_HUE, v * 256.0);
            }
        }
        ATTR_CURRENT_SAT => {
            if let Some(v) = ctx.numeric(record) {
                ctx.write_num(STATE_SAT, v);
            }
        }
        ATTR_CURRENT_X => {
            if let Some(v) = ctx.numeric(record) {
                ctx.write_num(STATE_X, v);
            }
        }
        ATTR_CURRENT_Y => {
            if let Some(v) = ctx.numeric(record) {
                ctx.write_num(STATE_Y, v);
            }
        }
        ATTR_COLOR_TEMPERATURE => {
            if let Some(v) = ctx.numeric(record) {
                ctx.write_num(STATE_CT, v);
            }
        }
        ATTR_COLOR_MODE => {
            if let Some(AttrValue::Uint(mode)) = record.value {
                let mode = match mode {
                    0 => "hs",
                    1 => "xy",
                    2 => "ct",
                    _ => return,
                };
                ctx.write(STATE_COLORMODE, ItemValue::Str(mode.to_string()));
            }
        }
        _ => {}
    }
}
