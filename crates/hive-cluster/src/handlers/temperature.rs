//! Temperature-measurement cluster (0x0402)
//!
//! Values are reported and stored in hundredths of a degree Celsius.

use hive_core::descriptors::STATE_TEMPERATURE;
use hive_core::ResourceKind;
use hive_wire::AttrRecord;

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0402;

const ATTR_MEASURED_VALUE: u16 = 0x0000;

/// Reported when the sensor has no valid measurement.
const INVALID_MEASUREMENT: f64 = -32768.0;

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
        if v == INVALID_MEASUREMENT {
            return;
        }
        ctx.write_num(STATE_TEMPERATURE, v);
    }
}
