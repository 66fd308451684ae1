//! Outbound request building
//!
//! Outbound traffic is a request record `(destination, profile, cluster,
//! frame bytes)` handed to the host send primitive. Ordinary commands are
//! fire-and-forget; request-response patterns register a pending entry that
//! the tick reaps on timeout.

use async_trait::async_trait;

use hive_wire::{
    commands::{CMD_READ_ATTRIBUTES, CMD_WRITE_ATTRIBUTES},
    FrameBuilder, WireWriter,
};

use crate::error::Result;

pub const PROFILE_HOME_AUTOMATION: u16 = 0x0104;
pub const PROFILE_DEVICE: u16 = 0x0000;

pub const CLUSTER_GROUPS: u16 = 0x0004;
pub const CLUSTER_SCENES: u16 = 0x0005;
pub const CLUSTER_ON_OFF: u16 = 0x0006;
pub const CLUSTER_LEVEL: u16 = 0x0008;
pub const CLUSTER_COLOR: u16 = 0x0300;

pub const ZDP_BIND_REQ: u16 = 0x0021;
pub const ZDP_MGMT_PERMIT_JOINING_REQ: u16 = 0x0036;
pub const ZDP_MGMT_NWK_UPDATE_REQ: u16 = 0x0038;

/// Mgmt_NWK_Update_req duration value that orders a channel change.
const NWK_UPDATE_CHANNEL_CHANGE: u8 = 0xFE;

const CMD_ADD_GROUP: u8 = 0x00;
const CMD_REMOVE_GROUP: u8 = 0x03;
const CMD_STORE_SCENE: u8 = 0x04;
const CMD_RECALL_SCENE: u8 = 0x05;
const CMD_REMOVE_SCENE: u8 = 0x02;
const CMD_OFF: u8 = 0x00;
const CMD_ON: u8 = 0x01;
const CMD_MOVE_TO_LEVEL_WITH_ON_OFF: u8 = 0x04;
const CMD_MOVE_TO_COLOR_TEMPERATURE: u8 = 0x0A;

/// Where an outbound request goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// 16-bit multicast group address
    Group(u16),
    /// Short-address unicast to one endpoint
    Nwk(u16, u8),
    /// Extended-address unicast to one endpoint
    Ext(u64, u8),
    /// Broadcast to all routers
    Broadcast,
}

/// One outbound request as handed to the host.
#[derive(Debug, Clone)]
pub struct ApsRequest {
    /// Request id, echoed in the confirm
    pub aps_req_id: u8,
    pub destination: Destination,
    pub profile_id: u16,
    pub cluster_id: u16,
    /// Encoded frame (header + payload)
    pub frame: Vec<u8>,
}

/// The host send primitive. Submissions return once the request is queued;
/// the confirm arrives later as an event.
#[async_trait]
pub trait HostLink: Send + Sync {
    /// Queue a request towards the radio.
    async fn aps_request(&self, req: ApsRequest) -> Result<()>;
}

/// Builds requests with running ids and sequence numbers.
#[derive(Debug, Default)]
pub struct RequestFactory {
    next_req_id: u8,
    next_seq: u8,
}

impl RequestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn req_id(&mut self) -> u8 {
        self.next_req_id = self.next_req_id.wrapping_add(1);
        self.next_req_id
    }

    fn seq(&mut self) -> u8 {
        self.next_seq = self.next_seq.wrapping_add(1);
        self.next_seq
    }

    fn cluster_request(
        &mut self,
        destination: Destination,
        cluster_id: u16,
        command: u8,
        payload: impl FnOnce(&mut WireWriter),
    ) -> ApsRequest {
        let frame = FrameBuilder::new(self.seq(), command)
            .cluster_command()
            .disable_default_response()
            .payload(payload)
            .build()
            .encode();
        ApsRequest {
            aps_req_id: self.req_id(),
            destination,
            profile_id: PROFILE_HOME_AUTOMATION,
            cluster_id,
            frame,
        }
    }

    /// read-attributes request for a set of attribute ids.
    pub fn read_attributes(
        &mut self,
        destination: Destination,
        cluster_id: u16,
        attrs: &[u16],
    ) -> ApsRequest {
        let frame = FrameBuilder::new(self.seq(), CMD_READ_ATTRIBUTES)
            .payload(|w| {
                for attr in attrs {
                    w.write_u16(*attr);
                }
            })
            .build()
            .encode();
        ApsRequest {
            aps_req_id: self.req_id(),
            destination,
            profile_id: PROFILE_HOME_AUTOMATION,
            cluster_id,
            frame,
        }
    }

    /// write-attributes request; each record is (attr id, type tag, value
    /// bytes already in wire order).
    pub fn write_attributes(
        &mut self,
        destination: Destination,
        cluster_id: u16,
        records: &[(u16, u8, &[u8])],
    ) -> ApsRequest {
        let frame = FrameBuilder::new(self.seq(), CMD_WRITE_ATTRIBUTES)
            .payload(|w| {
                for (attr, tag, value) in records {
                    w.write_u16(*attr);
                    w.write_u8(*tag);
                    w.write_raw(value);
                }
            })
            .build()
            .encode();
        ApsRequest {
            aps_req_id: self.req_id(),
            destination,
            profile_id: PROFILE_HOME_AUTOMATION,
            cluster_id,
            frame,
        }
    }

    pub fn add_group(&mut self, destination: Destination, group: u16) -> ApsRequest {
        self.cluster_request(destination, CLUSTER_GROUPS, CMD_ADD_GROUP, |w| {
            w.write_u16(group);
            w.write_string(""); // group name, unused on the air
        })
    }

    pub fn remove_group(&mut self, destination: Destination, group: u16) -> ApsRequest {
        self.cluster_request(destination, CLUSTER_GROUPS, CMD_REMOVE_GROUP, |w| {
            w.write_u16(group);
        })
    }

    pub fn store_scene(&mut self, destination: Destination, group: u16, scene: u8) -> ApsRequest {
        self.cluster_request(destination, CLUSTER_SCENES, CMD_STORE_SCENE, |w| {
            w.write_u16(group);
            w.write_u8(scene);
        })
    }

    pub fn recall_scene(&mut self, destination: Destination, group: u16, scene: u8) -> ApsRequest {
        self.cluster_request(destination, CLUSTER_SCENES, CMD_RECALL_SCENE, |w| {
            w.write_u16(group);
            w.write_u8(scene);
        })
    }

    pub fn remove_scene(&mut self, destination: Destination, group: u16, scene: u8) -> ApsRequest {
        self.cluster_request(destination, CLUSTER_SCENES, CMD_REMOVE_SCENE, |w| {
            w.write_u16(group);
            w.write_u8(scene);
        })
    }

    pub fn on_off(&mut self, destination: Destination, on: bool) -> ApsRequest {
        let command = if on { CMD_ON } else { CMD_OFF };
        self.cluster_request(destination, CLUSTER_ON_OFF, command, |_| {})
    }

    /// move-to-level with on/off; implies the light turns on.
    pub fn move_to_level(
        &mut self,
        destination: Destination,
        level: u8,
        transition_time: u16,
    ) -> ApsRequest {
        self.cluster_request(destination, CLUSTER_LEVEL, CMD_MOVE_TO_LEVEL_WITH_ON_OFF, |w| {
            w.write_u8(level);
            w.write_u16(transition_time);
        })
    }

    pub fn move_to_ct(
        &mut self,
        destination: Destination,
        ct: u16,
        transition_time: u16,
    ) -> ApsRequest {
        self.cluster_request(destination, CLUSTER_COLOR, CMD_MOVE_TO_COLOR_TEMPERATURE, |w| {
            w.write_u16(ct);
            w.write_u16(transition_time);
        })
    }

    /// ZDP bind request; returns the request and the ZDP sequence number
    /// the pending entry is keyed by.
    pub fn bind(
        &mut self,
        src_ext: u64,
        src_endpoint: u8,
        cluster_id: u16,
        dst_ext: u64,
        dst_endpoint: u8,
    ) -> (ApsRequest, u8) {
        let zdp_seq = self.seq();
        let mut w = WireWriter::new();
        w.write_u8(zdp_seq);
        w.write_u64(src_ext);
        w.write_u8(src_endpoint);
        w.write_u16(cluster_id);
        w.write_u8(0x03); // unicast destination address mode
        w.write_u64(dst_ext);
        w.write_u8(dst_endpoint);
        let req = ApsRequest {
            aps_req_id: self.req_id(),
            destination: Destination::Ext(src_ext, 0),
            profile_id: PROFILE_DEVICE,
            cluster_id: ZDP_BIND_REQ,
            frame: w.into_bytes(),
        };
        (req, zdp_seq)
    }

    /// ZDP network-update broadcast ordering a change to `channel`.
    pub fn network_update(&mut self, channel: u8, update_id: u8) -> ApsRequest {
        let zdp_seq = self.seq();
        let mut w = WireWriter::new();
        w.write_u8(zdp_seq);
        w.write_u32(1u32 << channel); // single-channel scan mask
        w.write_u8(NWK_UPDATE_CHANNEL_CHANGE);
        w.write_u8(update_id);
        ApsRequest {
            aps_req_id: self.req_id(),
            destination: Destination::Broadcast,
            profile_id: PROFILE_DEVICE,
            cluster_id: ZDP_MGMT_NWK_UPDATE_REQ,
            frame: w.into_bytes(),
        }
    }

    /// ZDP permit-joining broadcast to all routers.
    pub fn permit_join(&mut self, duration_secs: u8) -> ApsRequest {
        let zdp_seq = self.seq();
        let mut w = WireWriter::new();
        w.write_u8(zdp_seq);
        w.write_u8(duration_secs);
        w.write_u8(0x01); // trust-center significance
        ApsRequest {
            aps_req_id: self.req_id(),
            destination: Destination::Broadcast,
            profile_id: PROFILE_DEVICE,
            cluster_id: ZDP_MGMT_PERMIT_JOINING_REQ,
            frame: w.into_bytes(),
        }
    }
}
