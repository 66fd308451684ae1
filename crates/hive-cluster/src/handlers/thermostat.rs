//! Thermostat cluster (0x0201)
//!
//! Attribute reports feed the measured temperature and the heating
//! setpoint. The get-weekly-schedule response command is rewritten into a
//! day-keyed JSON map on `config/schedule`; a response naming a day
//! replaces that day's transitions wholesale, days not named are kept.

use hive_core::descriptors::{CONFIG_HEATSETPOINT, CONFIG_SCHEDULE, STATE_TEMPERATURE};
use hive_core::{ItemValue, ResourceKind};
use hive_wire::{AttrRecord, Frame, WireReader};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::dispatch::{ClusterHandler, HandlerCtx};

pub const CLUSTER: u16 = 0x0201;

const ATTR_LOCAL_TEMPERATURE: u16 = 0x0000;
const ATTR_OCCUPIED_HEATING_SETPOINT: u16 = 0x0012;

const CMD_GET_WEEKLY_SCHEDULE_RSP: u8 = 0x00;

/// Day-of-week bit order in the schedule payload.
const DAY_NAMES: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];

pub fn handler() -> ClusterHandler {
    ClusterHandler {
        cluster: CLUSTER,
        attr_target: Some(ResourceKind::Sensors),
        command_target: Some(ResourceKind::Sensors),
        on_attr,
        on_command: Some(on_command),
    }
}

fn on_attr(ctx: &mut HandlerCtx<'_>, record: &AttrRecord) {
    let suffix = match record.attr_id {
        ATTR_LOCAL_TEMPERATURE => STATE_TEMPERATURE,
        ATTR_OCCUPIED_HEATING_SETPOINT => CONFIG_HEATSETPOINT,
        _ => return,
    };
    if let Some(v) = ctx.numeric(record) {
        ctx.write_num(suffix, v);
    }
}

fn on_command(ctx: &mut HandlerCtx<'_>, frame: &Frame) {
    if frame.command != CMD_GET_WEEKLY_SCHEDULE_RSP {
        return;
    }
    let Some((days, transitions)) = decode_schedule(&frame.payload) else {
        debug!("malformed weekly schedule from {}", ctx.uniqueid);
        return;
    };

    // Last write wins per day: replace every day this response names,
    // keep the rest of the stored map untouched.
    let mut map: Map<String, Value> = ctx
        .current_str(CONFIG_SCHEDULE)
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    for day in days {
        map.insert(day.to_string(), Value::Array(transitions.clone()));
    }
    match serde_json::to_string(&map) {
        Ok(schedule) => ctx.write(CONFIG_SCHEDULE, ItemValue::Str(schedule)),
        Err(e) => debug!("schedule serialization failed: {}", e),
    }
}

/// Decode `(transition count, day bitmap, mode, transitions...)`; each
/// transition is minutes-since-midnight plus a heat setpoint.
fn decode_schedule(payload: &[u8]) -> Option<(Vec<&'static str>, Vec<Value>)> {
    let mut r = WireReader::new(payload);
    let count = r.read_u8();
    let day_bits = r.read_u8();
    let _mode = r.read_u8();

    let mut transitions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let minutes = r.read_u16();
        let setpoint = r.read_i16();
        if !r.ok() {
            return None;
        }
        transitions.push(json!({
            "start": format!("{:02}:{:02}", minutes / 60, minutes % 60),
            "heatsetpoint": setpoint,
        }));
    }
    if !r.ok() {
        return None;
    }

    let days: Vec<&'static str> = DAY_NAMES
        .iter()
        .enumerate()
        .filter(|(i, _)| day_bits & (1 << i) != 0)
        .map(|(_, name)| *name)
        .collect();
    Some((days, transitions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::{EventBus, ItemSet};
    use hive_wire::{commands::CMD_READ_ATTRIBUTES, FrameBuilder, WireWriter};

    fn schedule_frame(day_bits: u8, transitions: &[(u16, i16)]) -> Frame {
        FrameBuilder::new(1, CMD_GET_WEEKLY_SCHEDULE_RSP)
            .cluster_command()
            .server_to_client()
            .payload(|w: &mut WireWriter| {
                w.write_u8(transitions.len() as u8);
                w.write_u8(day_bits);
                w.write_u8(0x01);
                for (minutes, setpoint) in transitions {
                    w.write_u16(*minutes);
                    w.write_i16(*setpoint);
                }
            })
            .build()
    }

    fn ctx_on<'a>(items: &'a mut ItemSet, bus: &'a mut EventBus) -> HandlerCtx<'a> {
        HandlerCtx::new(
            "u-therm".into(),
            ResourceKind::Sensors,
            String::new(),
            CLUSTER,
            chrono::Utc::now(),
            items,
            bus,
        )
    }

    fn schedule_of(items: &ItemSet) -> Map<String, Value> {
        let raw = items.item(CONFIG_SCHEDULE).unwrap().value().as_str().unwrap().to_string();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_last_write_wins_per_day() {
        let mut items = ItemSet::new();
        let mut bus = EventBus::new();

        // Monday (bit 1) + Tuesday (bit 2) at 06:00.
        let frame = schedule_frame(0b0000_0110, &[(360, 2100)]);
        on_command(&mut ctx_on(&mut items, &mut bus), &frame);

        // Tuesday alone at 07:00 replaces Tuesday, Monday untouched.
        let frame = schedule_frame(0b0000_0100, &[(420, 1900)]);
        on_command(&mut ctx_on(&mut items, &mut bus), &frame);

        let map = schedule_of(&items);
        assert_eq!(map["Monday"][0]["start"], "06:00");
        assert_eq!(map["Monday"][0]["heatsetpoint"], 2100);
        assert_eq!(map["Tuesday"][0]["start"], "07:00");
        assert_eq!(map["Tuesday"][0]["heatsetpoint"], 1900);
        assert!(!map.contains_key("Wednesday"));
    }

    #[test]
    fn test_truncated_schedule_ignored() {
        let mut items = ItemSet::new();
        let mut bus = EventBus::new();
        // Claims two transitions but carries only one.
        let frame = FrameBuilder::new(1, CMD_GET_WEEKLY_SCHEDULE_RSP)
            .cluster_command()
            .payload(|w: &mut WireWriter| {
                w.write_u8(2);
                w.write_u8(0b0000_0010);
                w.write_u8(0x01);
                w.write_u16(360);
                w.write_i16(2100);
            })
            .build();
        on_command(&mut ctx_on(&mut items, &mut bus), &frame);
        assert!(!items.has(CONFIG_SCHEDULE));
    }

    #[test]
    fn test_other_commands_ignored() {
        let mut items = ItemSet::new();
        let mut bus = EventBus::new();
        let frame = FrameBuilder::new(1, CMD_READ_ATTRIBUTES).cluster_command().build();
        // Command id 0x00 collides with the schedule response id, so use a
        // distinct one.
        let mut frame = frame;
        frame.command = 0x03;
        on_command(&mut ctx_on(&mut items, &mut bus), &frame);
        assert!(!items.has(CONFIG_SCHEDULE));
    }
}
