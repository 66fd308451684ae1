//! Gateway core: the mutable resource state and every operation on it
//!
//! One instance lives behind a mutex in the process. REST handlers and the
//! main loop call into it synchronously; every method that must reach the
//! radio returns the requests to send instead of sending them, so the lock
//! is never held across an await point.
//!
//! ## Components
//!
//! - Device registry, group table and resourcelinks
//! - Permit-join, channel-change and watchdog machines, stepped by ticks
//! - API-key records and the admin unlock window
//! - The save scheduler feeding the persistence layer

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use hive_cluster::{
    ApsDataIndication, ApsRequest, Destination, Dispatcher, PendingTable, RequestFactory,
};
use hive_core::descriptors::{
    ACTION_BRI, ACTION_CT, ACTION_ON, ATTR_DDF_HASH, ATTR_DDF_POLICY, ATTR_MANUFACTURERNAME,
    ATTR_MODELID, CONFIG_CHANNEL, CONFIG_PERMITJOIN, STATE_BRI, STATE_COLORMODE, STATE_CT,
    STATE_HUE, STATE_ON, STATE_SAT, STATE_X, STATE_Y,
};
use hive_core::resourcelinks::{ResourceLink, ResourceLinkTable};
use hive_core::scene::ColorMode;
use hive_core::{
    ApiError, ApiErrorCode, DdfPolicy, Device, DeviceRegistry, EventBus, Group, GroupTable,
    ItemSet, ItemValue, LightState, ResourceEvent, ResourceKind, Scene, SourceTag,
};
use hive_ddf::{select_bundle, BundleHash, BundleStore, Selection};
use hive_net::{
    ChannelAction, ChannelChange, ChannelEvent, NetError, PermitJoin, PermitJoinAction, Watchdog,
};
use hive_state::{AuthRecord, DelayClass, SaveCategory, SaveScheduler};
use hive_wire::install_code::derive_link_key;

use crate::host::HostCommand;

/// API version string reported in the config view.
pub const API_VERSION: &str = "1.16.0";

/// Longest admin unlock window accepted from the API, in seconds.
const UNLOCK_LIMIT_SECS: u64 = 600;

/// Work a tick or host event produced for the async side.
#[derive(Debug, Default)]
pub struct TickOutput {
    /// Requests to hand to the host link
    pub requests: Vec<ApsRequest>,
    /// Host commands besides APS requests
    pub commands: Vec<HostCommand>,
    /// Save categories due for a disk write
    pub saves: Vec<SaveCategory>,
}

/// The single mutable gateway state.
pub struct GatewayCore {
    /// Gateway display name
    pub name: String,
    pub registry: DeviceRegistry,
    pub groups: GroupTable,
    pub links: ResourceLinkTable,
    /// Gateway-level config items (permitjoin, channel, ...)
    pub config: ItemSet,
    pub bus: EventBus,
    pub dispatcher: Dispatcher,
    pub factory: RequestFactory,
    pub pending: PendingTable,
    pub permit_join: PermitJoin,
    pub channel_change: ChannelChange,
    pub watchdog: Watchdog,
    pub saver: SaveScheduler,
    pub bundles: BundleStore,
    /// Live API-key records
    pub auth: Vec<AuthRecord>,
    /// Link keys derived from install codes, keyed by device key
    pub link_keys: HashMap<u64, [u8; 16]>,
    unlock_secs: u32,
    /// Request id of the in-flight channel-change broadcast
    update_req: Option<u8>,
}

impl GatewayCore {
    pub fn new(bundles: BundleStore) -> Self {
        let mut config = ItemSet::new();
        let now = Utc::now();
        if let Ok(item) = config.ensure(CONFIG_PERMITJOIN) {
            let _ = item.set_value(ItemValue::Uint(0), SourceTag::Internal, now);
        }
        if let Ok(item) = config.ensure(CONFIG_CHANNEL) {
            let _ = item.set_value(ItemValue::Uint(11), SourceTag::Internal, now);
        }
        Self {
            name: "hive-gateway".to_string(),
            registry: DeviceRegistry::new(),
            groups: GroupTable::new(),
            links: ResourceLinkTable::new(),
            config,
            bus: EventBus::new(),
            dispatcher: Dispatcher::new(),
            factory: RequestFactory::new(),
            pending: PendingTable::new(),
            permit_join: PermitJoin::new(),
            channel_change: ChannelChange::new(0),
            watchdog: Watchdog::new(),
            saver: SaveScheduler::new(),
            bundles,
            auth: Vec::new(),
            link_keys: HashMap::new(),
            unlock_secs: 0,
            update_req: None,
        }
    }

    /// Drain the event bus; the caller fans the events out.
    pub fn drain_events(&mut self) -> Vec<ResourceEvent> {
        self.bus.drain()
    }

    // ===== Authorization =====

    /// A key is accepted when it matches a live record or the admin unlock
    /// window is open.
    pub fn is_authorized(&self, key: &str) -> bool {
        self.unlock_secs > 0 || self.auth.iter().any(|a| a.api_key == key)
    }

    /// Stamp the last-used time of a key.
    pub fn touch_key(&mut self, key: &str) {
        if let Some(record) = self.auth.iter_mut().find(|a| a.api_key == key) {
            record.last_used = Utc::now().to_rfc3339();
            self.saver.request(SaveCategory::Auth, DelayClass::Huge);
        }
    }

    /// Open the admin unlock window.
    pub fn unlock(&mut self, secs: u32) {
        info!("unlock window open for {} s", secs);
        self.unlock_secs = secs;
    }

    /// Register a new API key. Allowed while the unlock window is open or
    /// when no key exists yet (first pairing).
    pub fn create_api_key(&mut self, device_type: &str) -> Result<String, ApiError> {
        if self.unlock_secs == 0 && !self.auth.is_empty() {
            return Err(ApiError::unauthorized());
        }
        let key = hex::encode_upper(rand::random::<[u8; 8]>());
        let now = Utc::now().to_rfc3339();
        info!("api key created for {}", device_type);
        self.auth.push(AuthRecord {
            api_key: key.clone(),
            device_type: device_type.to_string(),
            created_at: now.clone(),
            last_used: now,
        });
        self.saver.request(SaveCategory::Auth, DelayClass::Short);
        Ok(key)
    }

    pub fn delete_api_key(&mut self, key: &str) -> Result<(), ApiError> {
        let before = self.auth.len();
        self.auth.retain(|a| a.api_key != key);
        if self.auth.len() == before {
            return Err(ApiError::not_available(format!("/config/whitelist/{}", key)));
        }
        self.saver.request(SaveCategory::Auth, DelayClass::Short);
        Ok(())
    }

    // ===== Host events =====

    /// Inbound APS frame from the radio.
    pub fn handle_indication(&mut self, ind: &ApsDataIndication) {
        self.watchdog.feed();
        self.dispatcher.dispatch(&mut self.registry, &mut self.bus, ind);
    }

    /// Confirm for an earlier request.
    pub fn handle_confirm(&mut self, aps_req_id: u8, zdp_seq: Option<u8>, success: bool) -> TickOutput {
        self.watchdog.feed();
        let mut out = TickOutput::default();
        if let Some(entry) = self.pending.confirm(aps_req_id, zdp_seq) {
            if let Some(device) = self.registry.get_mut(entry.device_key) {
                if success {
                    device.failed_requests = 0;
                } else if device.record_failure() {
                    warn!("device 0x{:016X} quarantined", entry.device_key);
                }
            }
        }
        if self.update_req == Some(aps_req_id) {
            self.update_req = None;
            let actions = self.channel_change.step(ChannelEvent::Confirm(success));
            self.apply_channel_actions(actions, &mut out);
        }
        out
    }

    /// Host answered a channel read.
    pub fn on_current_channel(&mut self, channel: u8) -> TickOutput {
        self.watchdog.feed();
        self.set_config_item(CONFIG_CHANNEL, ItemValue::Uint(u64::from(channel)));
        let actions = self.channel_change.step(ChannelEvent::CurrentChannel(channel));
        let mut out = TickOutput::default();
        self.apply_channel_actions(actions, &mut out);
        out
    }

    /// Host answered a network-state poll.
    pub fn on_network_state(&mut self, joined: bool) -> TickOutput {
        self.watchdog.feed();
        let actions = self.channel_change.step(ChannelEvent::NetworkState(joined));
        let mut out = TickOutput::default();
        self.apply_channel_actions(actions, &mut out);
        out
    }

    // ===== Ticks =====

    /// One-second housekeeping tick.
    pub fn tick_second(&mut self) -> TickOutput {
        let mut out = TickOutput::default();

        if self.watchdog.tick() {
            self.bus.push(ResourceEvent::notify("degraded"));
        }
        self.unlock_secs = self.unlock_secs.saturating_sub(1);

        for action in self.permit_join.tick() {
            match action {
                PermitJoinAction::Broadcast(d) => out.requests.push(self.factory.permit_join(d)),
                PermitJoinAction::Disabled => {
                    self.set_config_item(CONFIG_PERMITJOIN, ItemValue::Uint(0));
                    self.bus.push(ResourceEvent::notify("permit-join-disabled"));
                }
            }
        }

        let actions = self.channel_change.step(ChannelEvent::TickSecond);
        self.apply_channel_actions(actions, &mut out);

        for entry in self.pending.reap(Instant::now()) {
            if let Some(device) = self.registry.get_mut(entry.device_key) {
                if device.record_failure() {
                    warn!("device 0x{:016X} quarantined", entry.device_key);
                }
            }
        }

        if !self.registry.take_dirty().is_empty() {
            self.saver.request(SaveCategory::Devices, DelayClass::Short);
        }
        out.saves = self.saver.tick();

        // Degraded mode: nothing leaves towards the radio.
        if self.watchdog.is_degraded() {
            out.requests.clear();
        }
        out
    }

    /// 100 ms fast-probe tick, live while a channel change disconnects.
    pub fn tick_fast(&mut self) -> TickOutput {
        let actions = self.channel_change.step(ChannelEvent::TickFast);
        let mut out = TickOutput::default();
        self.apply_channel_actions(actions, &mut out);
        out
    }

    fn apply_channel_actions(&mut self, actions: Vec<ChannelAction>, out: &mut TickOutput) {
        let mut queue = actions;
        while !queue.is_empty() {
            let mut next = Vec::new();
            for action in queue {
                match action {
                    ChannelAction::ReadChannel => out.commands.push(HostCommand::ReadChannel),
                    ChannelAction::BroadcastUpdate { channel, update_id } => {
                        let req = self.factory.network_update(channel, update_id);
                        self.update_req = Some(req.aps_req_id);
                        out.requests.push(req);
                        // Queueing towards the adapter only fails at shutdown.
                        next.extend(self.channel_change.step(ChannelEvent::SendResult(true)));
                    }
                    ChannelAction::LeaveNetwork => out.commands.push(HostCommand::LeaveNetwork),
                    ChannelAction::PollNetworkState => {
                        out.commands.push(HostCommand::PollNetworkState)
                    }
                    ChannelAction::JoinNetwork => out.commands.push(HostCommand::JoinNetwork),
                }
            }
            queue = next;
        }
    }

    // ===== Config =====

    pub fn config_view(&self) -> Value {
        json!({
            "name": self.name,
            "apiversion": API_VERSION,
            "swversion": env!("CARGO_PKG_VERSION"),
            "channel": self.config_num(CONFIG_CHANNEL),
            "permitjoin": self.config_num(CONFIG_PERMITJOIN),
            "networkupdateid": self.channel_change.network_update_id(),
            "devicecount": self.registry.len(),
            "degraded": self.watchdog.is_degraded(),
        })
    }

    fn config_num(&self, suffix: &str) -> i64 {
        self.config
            .item(suffix)
            .and_then(|i| i.value().as_i64())
            .unwrap_or(0)
    }

    /// Apply a `PUT /config` body field by field; per-field success or error
    /// entries, requests for the radio where a field needs them.
    pub fn set_config(&mut self, body: &Value) -> Result<(Vec<Value>, Vec<ApsRequest>), ApiError> {
        let mut responses = Vec::new();
        let mut requests = Vec::new();

        if let Some(v) = body.get("name") {
            match v.as_str() {
                Some(name) if !name.is_empty() && name.len() <= 32 => {
                    self.name = name.to_string();
                    self.bus.push(ResourceEvent::changed(ResourceKind::Config, "attr/name", ""));
                    self.saver.request(SaveCategory::Config, DelayClass::Short);
                    responses.push(success_entry("/config/name", json!(name)));
                }
                _ => responses.push(error_entry(ApiError::invalid_value("/config/name", v))),
            }
        }
        if let Some(v) = body.get("permitjoin") {
            match v.as_u64() {
                Some(secs) => match self.set_permit_join(secs) {
                    Ok(mut reqs) => {
                        requests.append(&mut reqs);
                        responses.push(success_entry("/config/permitjoin", json!(secs)));
                    }
                    Err(e) => responses.push(error_entry(e)),
                },
                None => {
                    responses.push(error_entry(ApiError::invalid_value("/config/permitjoin", v)))
                }
            }
        }
        if let Some(v) = body.get("channelchange") {
            match v.as_u64() {
                Some(ch) if ch <= 255 => match self.start_channel_change(ch as u8) {
                    Ok(()) => responses.push(success_entry("/config/channelchange", json!(ch))),
                    Err(e) => responses.push(error_entry(e)),
                },
                _ => {
                    responses.push(error_entry(ApiError::invalid_value("/config/channelchange", v)))
                }
            }
        }
        if let Some(v) = body.get("unlock") {
            match v.as_u64() {
                Some(secs) => {
                    let secs = secs.min(UNLOCK_LIMIT_SECS);
                    self.unlock(secs as u32);
                    responses.push(success_entry("/config/unlock", json!(secs)));
                }
                None => responses.push(error_entry(ApiError::invalid_value("/config/unlock", v))),
            }
        }

        if responses.is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::MissingParameter,
                "/config",
                "missing parameters in body",
            ));
        }
        Ok((responses, requests))
    }

    /// Reset the permit-join window; the config item validates the range.
    pub fn set_permit_join(&mut self, secs: u64) -> Result<Vec<ApsRequest>, ApiError> {
        self.config
            .set_item(
                ResourceKind::Config,
                "",
                CONFIG_PERMITJOIN,
                ItemValue::Uint(secs),
                SourceTag::Api,
                Utc::now(),
                &mut self.bus,
            )
            .map_err(|e| ApiError::new((&e).into(), "/config/permitjoin", e.to_string()))?;

        let mut requests = Vec::new();
        for action in self.permit_join.set(secs as u32) {
            match action {
                PermitJoinAction::Broadcast(d) => requests.push(self.factory.permit_join(d)),
                PermitJoinAction::Disabled => {
                    self.set_config_item(CONFIG_PERMITJOIN, ItemValue::Uint(0));
                    self.bus.push(ResourceEvent::notify("permit-join-disabled"));
                }
            }
        }
        Ok(requests)
    }

    pub fn start_channel_change(&mut self, channel: u8) -> Result<(), ApiError> {
        self.channel_change.start(channel).map_err(|e| match e {
            NetError::InvalidChannel(_) => {
                ApiError::invalid_value("/config/channelchange", channel)
            }
            other => {
                ApiError::new(ApiErrorCode::BridgeBusy, "/config/channelchange", other.to_string())
            }
        })
    }

    fn set_config_item(&mut self, suffix: &str, value: ItemValue) {
        let result = self.config.set_item(
            ResourceKind::Config,
            "",
            suffix,
            value,
            SourceTag::Internal,
            Utc::now(),
            &mut self.bus,
        );
        if let Err(e) = result {
            warn!("config item {} rejected: {}", suffix, e);
        }
    }

    // ===== Devices =====

    pub fn devices_view(&self) -> Value {
        Value::Array(self.registry.iter().map(|d| Value::String(d.key_string())).collect())
    }

    pub fn device_view(&self, key_str: &str) -> Result<Value, ApiError> {
        let device = self.find_device(key_str)?;
        let subdevices: Vec<Value> = device
            .sub_devices
            .iter()
            .map(|sub| {
                json!({
                    "uniqueid": sub.uniqueid(),
                    "type": sub.collection().collection(),
                    "attr": item_map(&sub.items, "attr/"),
                    "state": item_map(&sub.items, "state/"),
                    "config": item_map(&sub.items, "config/"),
                })
            })
            .collect();
        Ok(json!({
            "uniqueid": device.key_string(),
            "nwk": device.nwk_address,
            "attr": item_map(&device.items, "attr/"),
            "ddf_policy": device.ddf_policy().as_str(),
            "ddf_hash": device.ddf_hash(),
            "subdevices": subdevices,
        }))
    }

    fn find_device(&self, key_str: &str) -> Result<&Device, ApiError> {
        parse_device_key(key_str)
            .and_then(|key| self.registry.get(key))
            .ok_or_else(|| ApiError::not_available(format!("/devices/{}", key_str)))
    }

    /// Identity attributes for bundle matching, from whichever sub-device
    /// reported them.
    fn device_identity(device: &Device) -> (String, String) {
        let pick = |suffix: &str| {
            device
                .sub_devices
                .iter()
                .find_map(|s| {
                    s.items.item(suffix).and_then(|i| i.value().as_str().map(str::to_owned))
                })
                .unwrap_or_default()
        };
        (pick(ATTR_MANUFACTURERNAME), pick(ATTR_MODELID))
    }

    /// The bundle currently selected for a device.
    pub fn device_ddf(&self, key_str: &str) -> Result<Value, ApiError> {
        let device = self.find_device(key_str)?;
        let address = format!("/devices/{}/ddf", key_str);
        let (manufacturer, model) = Self::device_identity(device);
        let selection = select_bundle(
            &self.bundles,
            device.ddf_policy(),
            &device.ddf_hash(),
            &manufacturer,
            &model,
        )
        .map_err(|e| ApiError::new(ApiErrorCode::BridgeBusy, address.as_str(), e.to_string()))?;
        match selection {
            Selection::Bundle(entry) => Ok(json!({
                "policy": device.ddf_policy().as_str(),
                "hash": entry.hash.to_hex(),
                "file_hash": entry.file_hash.to_hex(),
                "descriptor": serde_json::to_value(&entry.descriptor).unwrap_or(Value::Null),
            })),
            Selection::RawJson => Ok(json!({ "policy": DdfPolicy::RawJson.as_str() })),
            Selection::NoDescription => Err(ApiError::not_available(address)),
        }
    }

    /// Change the DDF policy of a device. A pin without a valid hash is
    /// rejected before anything is touched.
    pub fn set_ddf_policy(&mut self, key_str: &str, body: &Value) -> Result<Vec<Value>, ApiError> {
        let address = format!("/devices/{}/ddf/policy", key_str);
        let key = parse_device_key(key_str)
            .filter(|k| self.registry.get(*k).is_some())
            .ok_or_else(|| ApiError::not_available(address.as_str()))?;

        let policy_str = body.get("policy").and_then(Value::as_str).ok_or_else(|| {
            ApiError::new(
                ApiErrorCode::MissingParameter,
                format!("{}/policy", address),
                "missing parameter, policy",
            )
        })?;
        let policy: DdfPolicy = policy_str
            .parse()
            .map_err(|_| ApiError::invalid_value(format!("{}/policy", address), policy_str))?;

        let pinned = if policy == DdfPolicy::Pin {
            let raw = body.get("hash").and_then(Value::as_str).ok_or_else(|| {
                ApiError::new(
                    ApiErrorCode::MissingParameter,
                    format!("{}/hash", address),
                    "missing parameter, hash",
                )
            })?;
            let hash = BundleHash::from_hex(raw)
                .map_err(|_| ApiError::invalid_value(format!("{}/hash", address), raw))?;
            Some(hash)
        } else {
            None
        };

        // Validation is done; only now do the items change.
        let now = Utc::now();
        let id = key_str.to_string();
        let mut responses = Vec::new();
        if let Some(device) = self.registry.get_mut(key) {
            let _ = device.items.set_item(
                ResourceKind::Devices,
                &id,
                ATTR_DDF_POLICY,
                ItemValue::Str(policy.as_str().to_string()),
                SourceTag::Api,
                now,
                &mut self.bus,
            );
            responses.push(success_entry(format!("{}/policy", address), json!(policy.as_str())));
            if let Some(hash) = pinned {
                let _ = device.items.set_item(
                    ResourceKind::Devices,
                    &id,
                    ATTR_DDF_HASH,
                    ItemValue::Str(hash.to_hex()),
                    SourceTag::Api,
                    now,
                    &mut self.bus,
                );
                responses.push(success_entry(format!("{}/hash", address), json!(hash.to_hex())));
            }
            device.dirty = true;
        }
        self.saver.request(SaveCategory::Devices, DelayClass::Short);
        Ok(responses)
    }

    /// Re-run bundle selection for a device.
    pub fn reload_ddf(&mut self, key_str: &str) -> Result<Vec<Value>, ApiError> {
        self.find_device(key_str)?;
        let address = format!("/devices/{}/ddf/reload", key_str);
        match self.device_ddf(key_str) {
            Ok(ddf) => {
                let hash = ddf.get("hash").cloned().unwrap_or(json!("none"));
                info!("ddf reloaded for {}: {}", key_str, hash);
                Ok(vec![success_entry(address, hash)])
            }
            Err(e) if e.code == ApiErrorCode::ResourceNotAvailable.code() => {
                info!("ddf reloaded for {}: no description", key_str);
                Ok(vec![success_entry(address, json!("none"))])
            }
            Err(e) => Err(e),
        }
    }

    /// Derive and store the link key for a device install code.
    pub fn set_install_code(&mut self, key_str: &str, body: &Value) -> Result<Vec<Value>, ApiError> {
        let address = format!("/devices/{}/installcode", key_str);
        let key = parse_device_key(key_str)
            .filter(|k| self.registry.get(*k).is_some())
            .ok_or_else(|| ApiError::not_available(address.as_str()))?;
        let code = body.get("installcode").and_then(Value::as_str).ok_or_else(|| {
            ApiError::new(
                ApiErrorCode::MissingParameter,
                address.as_str(),
                "missing parameter, installcode",
            )
        })?;
        let link_key = derive_link_key(code)
            .map_err(|_| ApiError::invalid_value(address.as_str(), code))?;
        info!("install code registered for 0x{:016X}", key);
        self.link_keys.insert(key, link_key);
        Ok(vec![success_entry(
            address,
            json!({
                "installcode": code,
                "mmohash": hex::encode_upper(link_key),
            }),
        )])
    }

    /// Remove a device with its sub-devices, group memberships and scene
    /// snapshots. Returns the canonical device id for the disk cascade.
    pub fn delete_device(&mut self, key_str: &str) -> Result<String, ApiError> {
        let address = format!("/devices/{}", key_str);
        let key = parse_device_key(key_str)
            .ok_or_else(|| ApiError::not_available(address.as_str()))?;
        let device_id = self
            .registry
            .get(key)
            .map(|d| d.key_string())
            .ok_or_else(|| ApiError::not_available(address.as_str()))?;
        self.registry
            .remove_device(key, &mut self.groups, &mut self.bus)
            .map_err(|e| ApiError::new((&e).into(), address.as_str(), e.to_string()))?;
        self.link_keys.remove(&key);
        self.saver.request(SaveCategory::Devices, DelayClass::Short);
        self.saver.request(SaveCategory::Groups, DelayClass::Long);
        Ok(device_id)
    }

    // ===== Groups =====

    pub fn groups_view(&self) -> Value {
        let mut map = serde_json::Map::new();
        for group in self.groups.iter() {
            map.insert(group.id().to_string(), group_json(group));
        }
        Value::Object(map)
    }

    pub fn group_view(&self, gid: u16) -> Result<Value, ApiError> {
        self.groups
            .get(gid)
            .map(group_json)
            .ok_or_else(|| ApiError::not_available(format!("/groups/{}", gid)))
    }

    /// Create a group at the lowest free address.
    pub fn create_group(&mut self, name: &str) -> Result<u16, ApiError> {
        let mut gid = 1u16;
        loop {
            match self.groups.create(gid, name, &mut self.bus) {
                Ok(_) => break,
                Err(_) if gid < 0xFFF0 => gid += 1,
                Err(e) => {
                    return Err(ApiError::new(
                        ApiErrorCode::BridgeGroupTableFull,
                        "/groups",
                        e.to_string(),
                    ))
                }
            }
        }
        self.saver.request(SaveCategory::Groups, DelayClass::Long);
        Ok(gid)
    }

    /// Rename a group and/or rewrite its membership.
    pub fn update_group(&mut self, gid: u16, body: &Value) -> Result<(Vec<Value>, Vec<ApsRequest>), ApiError> {
        let address = format!("/groups/{}", gid);
        if self.groups.get(gid).is_none() {
            return Err(ApiError::not_available(address));
        }
        let mut responses = Vec::new();
        let mut requests = Vec::new();

        if let Some(v) = body.get("name") {
            match v.as_str() {
                Some(name) if !name.is_empty() => {
                    if let Some(group) = self.groups.get_mut(gid) {
                        group.name = name.to_string();
                    }
                    self.bus.push(ResourceEvent::changed(
                        ResourceKind::Groups,
                        "attr/name",
                        &gid.to_string(),
                    ));
                    responses.push(success_entry(format!("{}/name", address), json!(name)));
                }
                _ => responses.push(error_entry(ApiError::invalid_value(
                    format!("{}/name", address),
                    v,
                ))),
            }
        }

        if let Some(list) = body.get("lights").and_then(Value::as_array) {
            let wanted: Vec<String> = list
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            let current: Vec<String> =
                self.groups.get(gid).map(|g| g.lights.clone()).unwrap_or_default();

            for uid in current.iter().filter(|u| !wanted.contains(u)) {
                if let Some((key, endpoint)) = self.light_endpoint(uid) {
                    requests.push(self.factory.remove_group(Destination::Ext(key, endpoint), gid));
                }
                if let Some(group) = self.groups.get_mut(gid) {
                    group.remove_light(uid);
                }
            }
            for uid in wanted.iter().filter(|u| !current.contains(u)) {
                let Some((key, endpoint)) = self.light_endpoint(uid) else {
                    responses.push(error_entry(ApiError::not_available(format!("/lights/{}", uid))));
                    continue;
                };
                if let Some(group) = self.groups.get_mut(gid) {
                    group.add_light(uid);
                }
                requests.push(self.factory.add_group(Destination::Ext(key, endpoint), gid));
            }
            self.bus.push(ResourceEvent::changed(
                ResourceKind::Groups,
                "attr/lights",
                &gid.to_string(),
            ));
            responses.push(success_entry(format!("{}/lights", address), json!(wanted)));
        }

        if responses.is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::MissingParameter,
                address,
                "missing parameters in body",
            ));
        }
        self.saver.request(SaveCategory::Groups, DelayClass::Long);
        Ok((responses, requests))
    }

    pub fn delete_group(&mut self, gid: u16) -> Result<Vec<ApsRequest>, ApiError> {
        let address = format!("/groups/{}", gid);
        self.groups
            .delete(gid, &mut self.bus)
            .map_err(|e| ApiError::new((&e).into(), address, e.to_string()))?;
        self.saver.request(SaveCategory::Groups, DelayClass::Long);
        Ok(vec![self.factory.remove_group(Destination::Group(gid), gid)])
    }

    /// Apply a group action body field by field. Brightness implies on, so
    /// a combined on+bri body sends only the move-to-level command.
    pub fn group_action(&mut self, gid: u16, body: &Value) -> Result<(Vec<Value>, Vec<ApsRequest>), ApiError> {
        let address = format!("/groups/{}/action", gid);
        let Some(group) = self.groups.get(gid) else {
            return Err(ApiError::not_available(address));
        };
        let lights = group.lights.clone();
        let has_bri = body.get("bri").is_some();
        let transition = body.get("transitiontime").and_then(Value::as_u64).unwrap_or(4) as u16;

        let mut responses = Vec::new();
        let mut requests = Vec::new();

        if let Some(v) = body.get("on") {
            match v.as_bool() {
                Some(on) => {
                    self.set_group_item(gid, ACTION_ON, ItemValue::Bool(on));
                    for uid in &lights {
                        self.set_light_item(uid, STATE_ON, ItemValue::Bool(on));
                    }
                    if !has_bri {
                        requests.push(self.factory.on_off(Destination::Group(gid), on));
                    }
                    responses.push(success_entry(format!("{}/on", address), json!(on)));
                }
                None => responses.push(error_entry(ApiError::invalid_value(
                    format!("{}/on", address),
                    v,
                ))),
            }
        }

        if let Some(v) = body.get("bri") {
            match v.as_u64().filter(|b| *b <= 255) {
                Some(bri) => {
                    self.set_group_item(gid, ACTION_BRI, ItemValue::Uint(bri));
                    for uid in &lights {
                        if body.get("on").is_none() {
                            self.set_light_item(uid, STATE_ON, ItemValue::Bool(true));
                        }
                        self.set_light_item(uid, STATE_BRI, ItemValue::Uint(bri));
                    }
                    requests.push(self.factory.move_to_level(
                        Destination::Group(gid),
                        bri as u8,
                        transition,
                    ));
                    responses.push(success_entry(format!("{}/bri", address), json!(bri)));
                }
                None => responses.push(error_entry(ApiError::invalid_value(
                    format!("{}/bri", address),
                    v,
                ))),
            }
        }

        if let Some(v) = body.get("ct") {
            match v.as_u64().filter(|ct| (153..=500).contains(ct)) {
                Some(ct) => {
                    self.set_group_item(gid, ACTION_CT, ItemValue::Uint(ct));
                    for uid in &lights {
                        self.set_light_item(uid, STATE_CT, ItemValue::Uint(ct));
                        self.set_light_item(uid, STATE_COLORMODE, ItemValue::Str("ct".to_string()));
                    }
                    requests.push(self.factory.move_to_ct(
                        Destination::Group(gid),
                        ct as u16,
                        transition,
                    ));
                    responses.push(success_entry(format!("{}/ct", address), json!(ct)));
                }
                None => responses.push(error_entry(ApiError::invalid_value(
                    format!("{}/ct", address),
                    v,
                ))),
            }
        }

        if body.get("transitiontime").is_some() {
            responses.push(success_entry(
                format!("{}/transitiontime", address),
                json!(transition),
            ));
        }

        if responses.is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::MissingParameter,
                address,
                "missing parameters in body",
            ));
        }
        Ok((responses, requests))
    }

    fn set_group_item(&mut self, gid: u16, suffix: &str, value: ItemValue) {
        let id = gid.to_string();
        if let Some(group) = self.groups.get_mut(gid) {
            let result = group.items.set_item(
                ResourceKind::Groups,
                &id,
                suffix,
                value,
                SourceTag::Api,
                Utc::now(),
                &mut self.bus,
            );
            if let Err(e) = result {
                warn!("group {} item {} rejected: {}", gid, suffix, e);
            }
        }
    }

    fn set_light_item(&mut self, uniqueid: &str, suffix: &str, value: ItemValue) {
        let now = Utc::now();
        if let Some((_, sub)) = self.registry.find_sub_device_mut(uniqueid) {
            let kind = sub.collection();
            let result =
                sub.items.set_item(kind, uniqueid, suffix, value, SourceTag::Api, now, &mut self.bus);
            if let Err(e) = result {
                warn!("item write {} on {} rejected: {}", suffix, uniqueid, e);
            }
        }
    }

    fn light_endpoint(&self, uniqueid: &str) -> Option<(u64, u8)> {
        self.registry.find_sub_device(uniqueid).map(|(key, sub)| (key, sub.endpoint))
    }

    // ===== Scenes =====

    /// Create a scene at the lowest free id and capture the member lights.
    pub fn create_scene(&mut self, gid: u16, name: &str) -> Result<(u8, Vec<Value>, Vec<ApsRequest>), ApiError> {
        let address = format!("/groups/{}/scenes", gid);
        let sid = {
            let Some(group) = self.groups.get(gid) else {
                return Err(ApiError::not_available(format!("/groups/{}", gid)));
            };
            (1..=u8::MAX)
                .find(|v| group.scene(*v).is_none())
                .ok_or_else(|| {
                    ApiError::new(ApiErrorCode::TooManyItems, address.as_str(), "scene table full")
                })?
        };
        if let Some(group) = self.groups.get_mut(gid) {
            group
                .add_scene(Scene::new(sid, name))
                .map_err(|e| ApiError::new((&e).into(), address.as_str(), e.to_string()))?;
        }
        self.bus.push(ResourceEvent::added(ResourceKind::Scenes, &format!("{}/{}", gid, sid)));
        let (mut responses, requests) = self.store_scene(gid, sid)?;
        responses.insert(0, success_entry("id", json!(sid.to_string())));
        Ok((sid, responses, requests))
    }

    /// Capture the current member-light state into a scene, creating it if
    /// absent. A light with an exhausted scene table gets an error entry but
    /// never blocks the others.
    pub fn store_scene(&mut self, gid: u16, sid: u8) -> Result<(Vec<Value>, Vec<ApsRequest>), ApiError> {
        let address = format!("/groups/{}/scenes/{}", gid, sid);
        let lights = {
            let Some(group) = self.groups.get(gid) else {
                return Err(ApiError::not_available(format!("/groups/{}", gid)));
            };
            group.lights.clone()
        };
        {
            let group = self.groups.get_mut(gid).expect("present above");
            if group.scene(sid).is_none() {
                group
                    .add_scene(Scene::new(sid, format!("Scene {}", sid)))
                    .map_err(|e| ApiError::new((&e).into(), address.as_str(), e.to_string()))?;
                self.bus
                    .push(ResourceEvent::added(ResourceKind::Scenes, &format!("{}/{}", gid, sid)));
            }
        }

        let mut responses = Vec::new();
        for uid in &lights {
            let light_address = format!("{}/lights/{}", address, uid);
            let Some((key, _)) = self.registry.find_sub_device(uid) else {
                responses.push(error_entry(ApiError::not_available(light_address)));
                continue;
            };
            let state = self.capture_light_state(uid);
            let device = self.registry.get_mut(key).expect("sub-device found above");
            if device.scene_capacity == 0 {
                responses.push(error_entry(ApiError::new(
                    ApiErrorCode::DeviceScenesTableFull,
                    light_address,
                    format!("device, {}, scene table full", uid),
                )));
                continue;
            }
            device.scene_capacity -= 1;
            device.dirty = true;
            if let Some(scene) = self.groups.get_mut(gid).and_then(|g| g.scene_mut(sid)) {
                scene.set_light(state);
            }
            responses.push(success_entry(light_address, json!("stored")));
        }

        debug!("scene {}/{} stored for {} lights", gid, sid, lights.len());
        self.saver.request(SaveCategory::Scenes, DelayClass::Long);
        let requests = vec![self.factory.store_scene(Destination::Group(gid), gid, sid)];
        Ok((responses, requests))
    }

    /// Recall a scene; `sid` may be a literal id or `next`/`prev`. A missing
    /// scene fails before any light is touched.
    pub fn recall_scene(&mut self, gid: u16, sid: &str) -> Result<(Vec<Value>, Vec<ApsRequest>), ApiError> {
        let group_address = format!("/groups/{}", gid);
        let (scene_id, states) = {
            let Some(group) = self.groups.get(gid) else {
                return Err(ApiError::not_available(group_address));
            };
            let scene_id = group.resolve_scene_id(sid).map_err(|e| {
                ApiError::new(
                    (&e).into(),
                    format!("{}/scenes/{}", group_address, sid),
                    e.to_string(),
                )
            })?;
            let states =
                group.scene(scene_id).map(|s| s.lights.clone()).unwrap_or_default();
            (scene_id, states)
        };

        let mut responses = vec![success_entry(
            format!("{}/scenes/{}/recall", group_address, scene_id),
            json!(true),
        )];
        for state in &states {
            if self.registry.find_sub_device(&state.uniqueid).is_none() {
                responses.push(error_entry(ApiError::not_available(format!(
                    "/lights/{}",
                    state.uniqueid
                ))));
                continue;
            }
            self.apply_light_state(state);
        }
        if let Some(group) = self.groups.get_mut(gid) {
            group.set_current_scene(scene_id, &mut self.bus);
        }
        let requests = vec![self.factory.recall_scene(Destination::Group(gid), gid, scene_id)];
        Ok((responses, requests))
    }

    /// Rewrite the stored snapshot of one light inside a scene.
    pub fn modify_scene_light(
        &mut self,
        gid: u16,
        sid: u8,
        uniqueid: &str,
        body: &Value,
    ) -> Result<Vec<Value>, ApiError> {
        let address = format!("/groups/{}/scenes/{}/lights/{}/state", gid, sid, uniqueid);
        let mut responses = Vec::new();
        {
            let group = self
                .groups
                .get_mut(gid)
                .ok_or_else(|| ApiError::not_available(format!("/groups/{}", gid)))?;
            let scene = group
                .scene_mut(sid)
                .ok_or_else(|| ApiError::not_available(address.as_str()))?;
            let Some(state) = scene.lights.iter_mut().find(|l| l.uniqueid == uniqueid) else {
                return Err(ApiError::not_available(address));
            };

            if let Some(on) = body.get("on").and_then(Value::as_bool) {
                state.on = on;
                responses.push(success_entry(format!("{}/on", address), json!(on)));
            }
            if let Some(bri) = body.get("bri").and_then(Value::as_u64).filter(|b| *b <= 255) {
                state.bri = bri as u8;
                responses.push(success_entry(format!("{}/bri", address), json!(bri)));
            }
            if let Some(ct) = body.get("ct").and_then(Value::as_u64).filter(|c| (153..=500).contains(c)) {
                state.ct = ct as u16;
                state.color_mode = ColorMode::Ct;
                responses.push(success_entry(format!("{}/ct", address), json!(ct)));
            }
            if let Some(tt) = body.get("transitiontime").and_then(Value::as_u64).filter(|t| *t <= 0xFFFF) {
                state.transition_time = tt as u16;
                responses.push(success_entry(format!("{}/transitiontime", address), json!(tt)));
            }
        }
        if responses.is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::MissingParameter,
                address,
                "missing parameters in body",
            ));
        }
        self.saver.request(SaveCategory::Scenes, DelayClass::Long);
        Ok(responses)
    }

    pub fn delete_scene(&mut self, gid: u16, sid: u8) -> Result<Vec<ApsRequest>, ApiError> {
        let address = format!("/groups/{}/scenes/{}", gid, sid);
        let group = self
            .groups
            .get_mut(gid)
            .ok_or_else(|| ApiError::not_available(format!("/groups/{}", gid)))?;
        group
            .remove_scene(sid)
            .map_err(|e| ApiError::new((&e).into(), address, e.to_string()))?;
        self.bus.push(ResourceEvent::deleted(ResourceKind::Scenes, &format!("{}/{}", gid, sid)));
        self.saver.request(SaveCategory::Scenes, DelayClass::Long);
        Ok(vec![self.factory.remove_scene(Destination::Group(gid), gid, sid)])
    }

    fn capture_light_state(&self, uniqueid: &str) -> LightState {
        let mut state = LightState::new(uniqueid);
        let Some((_, sub)) = self.registry.find_sub_device(uniqueid) else {
            return state;
        };
        let items = &sub.items;
        if let Some(v) = items.item(STATE_ON).and_then(|i| i.value().as_bool()) {
            state.on = v;
        }
        if let Some(v) = items.item(STATE_BRI).and_then(|i| i.value().as_i64()) {
            state.bri = v.clamp(0, 255) as u8;
        }
        if let Some(v) = items.item(STATE_CT).and_then(|i| i.value().as_i64()) {
            state.ct = v.clamp(0, i64::from(u16::MAX)) as u16;
        }
        if let Some(v) = items.item(STATE_X).and_then(|i| i.value().as_i64()) {
            state.x = v.clamp(0, i64::from(u16::MAX)) as u16;
        }
        if let Some(v) = items.item(STATE_Y).and_then(|i| i.value().as_i64()) {
            state.y = v.clamp(0, i64::from(u16::MAX)) as u16;
        }
        if let Some(v) = items.item(STATE_HUE).and_then(|i| i.value().as_i64()) {
            state.enhanced_hue = v.clamp(0, i64::from(u16::MAX)) as u16;
        }
        if let Some(v) = items.item(STATE_SAT).and_then(|i| i.value().as_i64()) {
            state.sat = v.clamp(0, 255) as u8;
        }
        state.color_mode = match items.item(STATE_COLORMODE).and_then(|i| i.value().as_str()) {
            Some("xy") => ColorMode::Xy,
            Some("ct") => ColorMode::Ct,
            Some("hs") => ColorMode::Hs,
            _ => ColorMode::None,
        };
        state
    }

    fn apply_light_state(&mut self, state: &LightState) {
        let uid = state.uniqueid.clone();
        self.set_light_item(&uid, STATE_ON, ItemValue::Bool(state.on));
        self.set_light_item(&uid, STATE_BRI, ItemValue::Uint(u64::from(state.bri)));
        match state.color_mode {
            ColorMode::Ct => {
                self.set_light_item(&uid, STATE_CT, ItemValue::Uint(u64::from(state.ct)));
                self.set_light_item(&uid, STATE_COLORMODE, ItemValue::Str("ct".to_string()));
            }
            ColorMode::Xy => {
                self.set_light_item(&uid, STATE_X, ItemValue::Uint(u64::from(state.x)));
                self.set_light_item(&uid, STATE_Y, ItemValue::Uint(u64::from(state.y)));
                self.set_light_item(&uid, STATE_COLORMODE, ItemValue::Str("xy".to_string()));
            }
            ColorMode::Hs => {
                self.set_light_item(&uid, STATE_HUE, ItemValue::Uint(u64::from(state.enhanced_hue)));
                self.set_light_item(&uid, STATE_SAT, ItemValue::Uint(u64::from(state.sat)));
                self.set_light_item(&uid, STATE_COLORMODE, ItemValue::Str("hs".to_string()));
            }
            ColorMode::None => {}
        }
    }

    // ===== Resourcelinks =====

    pub fn resource_links_view(&self) -> Value {
        let mut map = serde_json::Map::new();
        for link in self.links.iter() {
            if let Ok(v) = serde_json::to_value(link) {
                map.insert(link.id.to_string(), v);
            }
        }
        Value::Object(map)
    }

    pub fn create_resource_link(&mut self, body: &Value, owner: &str) -> Result<u16, ApiError> {
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ApiError::new(
                    ApiErrorCode::MissingParameter,
                    "/resourcelinks",
                    "missing parameter, name",
                )
            })?
            .to_string();
        let mut link = ResourceLink::new(0, name);
        link.owner = owner.to_string();
        if let Some(d) = body.get("description").and_then(Value::as_str) {
            link.description = d.to_string();
        }
        if let Some(c) = body.get("classid").and_then(Value::as_u64) {
            link.classid = c.min(u64::from(u16::MAX)) as u16;
        }
        if let Some(r) = body.get("recycle").and_then(Value::as_bool) {
            link.recycle = r;
        }
        if let Some(l) = body.get("links").and_then(Value::as_array) {
            link.links = l.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        }
        let id = self.links.create(link, &mut self.bus);
        self.saver.request(SaveCategory::ResourceLinks, DelayClass::Long);
        Ok(id)
    }

    pub fn update_resource_link(&mut self, id: u16, body: &Value) -> Result<Vec<Value>, ApiError> {
        let address = format!("/resourcelinks/{}", id);
        let link = self
            .links
            .get_mut(id)
            .ok_or_else(|| ApiError::not_available(address.as_str()))?;
        let mut responses = Vec::new();
        if let Some(name) = body.get("name").and_then(Value::as_str) {
            link.name = name.to_string();
            responses.push(success_entry(format!("{}/name", address), json!(name)));
        }
        if let Some(d) = body.get("description").and_then(Value::as_str) {
            link.description = d.to_string();
            responses.push(success_entry(format!("{}/description", address), json!(d)));
        }
        if let Some(l) = body.get("links").and_then(Value::as_array) {
            link.links = l.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            responses.push(success_entry(format!("{}/links", address), json!(link.links)));
        }
        if responses.is_empty() {
            return Err(ApiError::new(
                ApiErrorCode::MissingParameter,
                address,
                "missing parameters in body",
            ));
        }
        self.bus.push(ResourceEvent::changed(ResourceKind::ResourceLinks, "", &id.to_string()));
        self.saver.request(SaveCategory::ResourceLinks, DelayClass::Long);
        Ok(responses)
    }

    pub fn delete_resource_link(&mut self, id: u16) -> Result<(), ApiError> {
        let address = format!("/resourcelinks/{}", id);
        self.links
            .delete(id, &mut self.bus)
            .map_err(|e| ApiError::new((&e).into(), address, e.to_string()))?;
        self.saver.request(SaveCategory::ResourceLinks, DelayClass::Long);
        Ok(())
    }
}

/// Parse a colon-separated device key, e.g. `00:21:2e:ff:fe:01:02:03`.
pub fn parse_device_key(s: &str) -> Option<u64> {
    let hex: String = s.split(':').collect();
    if hex.len() != 16 {
        return None;
    }
    u64::from_str_radix(&hex, 16).ok()
}

/// One success entry of a response list.
pub fn success_entry(address: impl Into<String>, value: Value) -> Value {
    let mut inner = serde_json::Map::new();
    inner.insert(address.into(), value);
    json!({ "success": inner })
}

/// One error entry of a response list.
pub fn error_entry(err: ApiError) -> Value {
    json!({ "error": err })
}

fn group_json(group: &Group) -> Value {
    json!({
        "name": group.name,
        "lights": group.lights,
        "scenes": group
            .scenes
            .iter()
            .map(|s| json!({
                "id": s.id.to_string(),
                "name": s.name,
                "transitiontime": s.transition_time,
                "lightcount": s.lights.len(),
            }))
            .collect::<Vec<_>>(),
        "action": item_map(&group.items, "action/"),
        "state": item_map(&group.items, "state/"),
    })
}

/// Items under one suffix prefix as a JSON object.
fn item_map(items: &ItemSet, prefix: &str) -> Value {
    let mut map = serde_json::Map::new();
    for item in items.items() {
        if let Some(field) = item.suffix().strip_prefix(prefix) {
            if let Ok(v) = serde_json::to_value(item.value()) {
                map.insert(field.to_string(), v);
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::SubDeviceType;
    use tempfile::TempDir;

    fn core() -> (GatewayCore, TempDir) {
        let dir = TempDir::new().unwrap();
        let bundles =
            BundleStore::open(dir.path().join("system"), dir.path().join("user")).unwrap();
        (GatewayCore::new(bundles), dir)
    }

    fn add_light(core: &mut GatewayCore, key: u64) -> String {
        core.registry.announce(key, 0x1234, &mut core.bus);
        let uniqueid = core.registry.get(key).unwrap().uniqueid_for(1, 0x0006);
        core.registry
            .create_sub_device(key, 1, SubDeviceType::Light, uniqueid.clone(), &mut core.bus)
            .unwrap();
        uniqueid
    }

    fn group_with_lights(core: &mut GatewayCore, gid: u16, keys: &[u64]) -> Vec<String> {
        core.groups.create(gid, "Living room", &mut core.bus).unwrap();
        let mut uids = Vec::new();
        for key in keys {
            let uid = add_light(core, *key);
            core.groups.get_mut(gid).unwrap().add_light(&uid);
            uids.push(uid);
        }
        uids
    }

    #[test]
    fn test_group_action_bri_implies_on() {
        let (mut core, _dir) = core();
        let uids = group_with_lights(&mut core, 1, &[0xA1, 0xA2]);

        let body = json!({ "on": true, "bri": 200 });
        let (responses, requests) = core.group_action(1, &body).unwrap();

        assert_eq!(responses[0], json!({ "success": { "/groups/1/action/on": true } }));
        assert_eq!(responses[1], json!({ "success": { "/groups/1/action/bri": 200 } }));

        // Only the move-to-level command goes out; it implies on.
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].cluster_id, 0x0008);

        for uid in &uids {
            let (_, sub) = core.registry.find_sub_device(uid).unwrap();
            assert_eq!(sub.items.item(STATE_ON).unwrap().value().as_bool(), Some(true));
            assert_eq!(sub.items.item(STATE_BRI).unwrap().value().as_i64(), Some(200));
        }
    }

    #[test]
    fn test_group_action_on_alone_sends_on_off() {
        let (mut core, _dir) = core();
        group_with_lights(&mut core, 1, &[0xB1]);
        let (_, requests) = core.group_action(1, &json!({ "on": false })).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].cluster_id, 0x0006);
    }

    #[test]
    fn test_group_action_unknown_group() {
        let (mut core, _dir) = core();
        let err = core.group_action(9, &json!({ "on": true })).unwrap_err();
        assert_eq!(err.code, ApiErrorCode::ResourceNotAvailable.code());
    }

    #[test]
    fn test_permit_join_countdown_closes_once() {
        let (mut core, _dir) = core();
        let requests = core.set_permit_join(60).unwrap();
        assert!(!requests.is_empty());

        let mut disabled = 0;
        for _ in 0..70 {
            core.watchdog.feed();
            core.tick_second();
            for event in core.drain_events() {
                if event.suffix == "permit-join-disabled" {
                    disabled += 1;
                }
            }
        }
        assert_eq!(disabled, 1);
        assert_eq!(core.config_num(CONFIG_PERMITJOIN), 0);
    }

    #[test]
    fn test_ddf_policy_pin_bad_hash_leaves_policy_alone() {
        let (mut core, _dir) = core();
        add_light(&mut core, 0xC1);
        let key_str = core.registry.get(0xC1).unwrap().key_string();

        let err = core
            .set_ddf_policy(&key_str, &json!({ "policy": "pin", "hash": "zz" }))
            .unwrap_err();
        assert_eq!(err.code, ApiErrorCode::InvalidValue.code());
        assert!(err.address.ends_with("/hash"));

        let device = core.registry.get(0xC1).unwrap();
        assert_eq!(device.ddf_policy(), DdfPolicy::LatestPreferStable);
        assert_eq!(device.ddf_hash(), "");
    }

    #[test]
    fn test_ddf_policy_pin_valid_hash() {
        let (mut core, _dir) = core();
        add_light(&mut core, 0xC2);
        let key_str = core.registry.get(0xC2).unwrap().key_string();
        let hash = "ab".repeat(32);

        let responses = core
            .set_ddf_policy(&key_str, &json!({ "policy": "pin", "hash": hash }))
            .unwrap();
        assert_eq!(responses.len(), 2);
        let device = core.registry.get(0xC2).unwrap();
        assert_eq!(device.ddf_policy(), DdfPolicy::Pin);
        assert_eq!(device.ddf_hash(), hash);
    }

    #[test]
    fn test_install_code_derives_mmo_hash() {
        let (mut core, _dir) = core();
        add_light(&mut core, 0xD1);
        let key_str = core.registry.get(0xD1).unwrap().key_string();

        let responses = core
            .set_install_code(&key_str, &json!({ "installcode": "83FED3407A939723A5C639FF4C12" }))
            .unwrap();
        let entry = responses[0]["success"]
            .as_object()
            .unwrap()
            .values()
            .next()
            .unwrap()
            .clone();
        assert_eq!(entry["mmohash"], "58C1828CF7F1C3FE29E7B1024AD84BFA");
        assert!(core.link_keys.contains_key(&0xD1));
    }

    #[test]
    fn test_recall_missing_scene_touches_nothing() {
        let (mut core, _dir) = core();
        let uids = group_with_lights(&mut core, 1, &[0xE1]);

        let err = core.recall_scene(1, "5").unwrap_err();
        assert_eq!(err.code, ApiErrorCode::ResourceNotAvailable.code());

        let (_, sub) = core.registry.find_sub_device(&uids[0]).unwrap();
        assert!(sub.items.item(STATE_ON).is_none());
    }

    #[test]
    fn test_store_scene_capacity_partial_success() {
        let (mut core, _dir) = core();
        let uids = group_with_lights(&mut core, 1, &[0xF1, 0xF2]);
        core.registry.get_mut(0xF1).unwrap().scene_capacity = 0;

        let (responses, requests) = core.store_scene(1, 1).unwrap();
        assert_eq!(requests.len(), 1);

        let full: Vec<&Value> = responses.iter().filter(|r| r.get("error").is_some()).collect();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0]["error"]["type"], 402);

        // The other light was captured.
        let scene = core.groups.get(1).unwrap().scene(1).unwrap();
        assert!(scene.light(&uids[1]).is_some());
        assert!(scene.light(&uids[0]).is_none());
    }

    #[test]
    fn test_recall_next_wraps_and_applies() {
        let (mut core, _dir) = core();
        let uids = group_with_lights(&mut core, 1, &[0xF5]);
        core.set_light_item(&uids[0], STATE_ON, ItemValue::Bool(true));
        core.set_light_item(&uids[0], STATE_BRI, ItemValue::Uint(42));
        core.store_scene(1, 1).unwrap();
        core.set_light_item(&uids[0], STATE_BRI, ItemValue::Uint(250));

        let (responses, requests) = core.recall_scene(1, "next").unwrap();
        assert!(responses[0]["success"].is_object());
        assert_eq!(requests.len(), 1);

        let (_, sub) = core.registry.find_sub_device(&uids[0]).unwrap();
        assert_eq!(sub.items.item(STATE_BRI).unwrap().value().as_i64(), Some(42));
        assert_eq!(core.groups.get(1).unwrap().current_scene(), Some(1));
    }

    #[test]
    fn test_api_key_needs_unlock_after_first() {
        let (mut core, _dir) = core();
        let first = core.create_api_key("app#one").unwrap();
        assert_eq!(first.len(), 16);

        let err = core.create_api_key("app#two").unwrap_err();
        assert_eq!(err.code, ApiErrorCode::UnauthorizedUser.code());

        core.unlock(60);
        assert!(core.create_api_key("app#two").is_ok());
        assert!(core.is_authorized(&first));
    }

    #[test]
    fn test_degraded_tick_drops_radio_writes() {
        let (mut core, _dir) = core();
        core.set_permit_join(300).unwrap();
        // Starve the watchdog, then expect rebroadcasts to be swallowed.
        for _ in 0..60 {
            core.tick_second();
        }
        assert!(core.watchdog.is_degraded());
        let out = core.tick_second();
        assert!(out.requests.is_empty());
    }

    #[test]
    fn test_delete_device_scrubs_groups() {
        let (mut core, _dir) = core();
        let uids = group_with_lights(&mut core, 1, &[0xAA]);
        core.store_scene(1, 1).unwrap();
        let key_str = core.registry.get(0xAA).unwrap().key_string();

        core.delete_device(&key_str).unwrap();
        assert!(core.registry.get(0xAA).is_none());
        let group = core.groups.get(1).unwrap();
        assert!(!group.has_light(&uids[0]));
        assert!(group.scene(1).unwrap().light(&uids[0]).is_none());
    }

    #[test]
    fn test_parse_device_key() {
        assert_eq!(parse_device_key("00:00:00:00:00:00:00:a1"), Some(0xA1));
        assert_eq!(parse_device_key("not-a-key"), None);
    }
}
