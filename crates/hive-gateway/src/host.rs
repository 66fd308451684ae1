//! Host-link plumbing between the async loop and the radio adapter
//!
//! The gateway core is synchronous state behind a mutex; everything that
//! must reach the radio leaves through the channel-backed [`HostLink`]
//! here, and everything coming back from the adapter enters the main loop
//! as a [`HostEvent`]. The serial protocol itself lives in the adapter
//! process on the other side of these channels.

use async_trait::async_trait;
use tokio::sync::mpsc;

use hive_cluster::{ApsDataIndication, ApsRequest, ClusterError, HostLink};

/// Events the radio adapter feeds into the main loop.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// Inbound APS frame
    Indication(ApsDataIndication),
    /// Confirm for an earlier request
    Confirm {
        /// Request id echoed by the host
        aps_req_id: u8,
        /// ZDP sequence for ZDP requests
        zdp_seq: Option<u8>,
        /// Whether the request was delivered
        success: bool,
    },
    /// Answer to a channel read
    CurrentChannel(u8),
    /// Answer to a network-state poll: currently joined
    NetworkState(bool),
    /// Coordinator firmware version; `None` means bootloader-only
    FirmwareVersion(Option<u32>),
}

/// Commands the loop forwards to the adapter besides APS requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Read the current radio channel
    ReadChannel,
    /// Leave the network
    LeaveNetwork,
    /// Rejoin the network
    JoinNetwork,
    /// Poll whether the host is joined
    PollNetworkState,
    /// Read the coordinator firmware version
    ReadFirmwareVersion,
}

/// [`HostLink`] implementation that queues requests towards the adapter
/// task. Submission fails only when the adapter side is gone.
pub struct ChannelHost {
    tx: mpsc::Sender<ApsRequest>,
}

impl ChannelHost {
    pub fn new(tx: mpsc::Sender<ApsRequest>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl HostLink for ChannelHost {
    async fn aps_request(&self, req: ApsRequest) -> hive_cluster::Result<()> {
        self.tx.send(req).await.map_err(|_| ClusterError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_cluster::Destination;

    fn request() -> ApsRequest {
        ApsRequest {
            aps_req_id: 1,
            destination: Destination::Broadcast,
            profile_id: 0x0104,
            cluster_id: 0x0006,
            frame: vec![0x01],
        }
    }

    #[tokio::test]
    async fn test_request_reaches_adapter() {
        let (tx, mut rx) = mpsc::channel(4);
        let host = ChannelHost::new(tx);
        host.aps_request(request()).await.unwrap();
        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.aps_req_id, 1);
    }

    #[tokio::test]
    async fn test_closed_adapter_is_not_connected() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let host = ChannelHost::new(tx);
        let err = host.aps_request(request()).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotConnected));
    }
}
