//! Channel-change state machine
//!
//! Edge-triggered: external events (confirm, network-state poll results)
//! push the state forward, and absent any event the timers advance it via
//! timeouts. The machine never talks to the host directly; every step
//! returns the actions the caller must perform.

use tracing::{debug, info, warn};

use crate::error::{NetError, Result};

const CHANNEL_MIN: u8 = 11;
const CHANNEL_MAX: u8 = 26;

const BROADCAST_RETRIES: u8 = 3;
const CONFIRM_TIMEOUT_SECS: u32 = 10;
const DISCONNECT_POLLS: u8 = 10;
const RECONNECT_ATTEMPTS: u8 = 10;
const RECONNECT_INTERVAL_SECS: u32 = 5;

/// States of the channel-change protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    VerifyChannel,
    ChangeChannel,
    WaitConfirm,
    DisconnectingNetwork,
    ReconnectNetwork,
}

impl ChannelState {
    pub fn name(self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::VerifyChannel => "verify-channel",
            ChannelState::ChangeChannel => "change-channel",
            ChannelState::WaitConfirm => "wait-confirm",
            ChannelState::DisconnectingNetwork => "disconnecting-network",
            ChannelState::ReconnectNetwork => "reconnect-network",
        }
    }
}

/// External events fed into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One-second timer
    TickSecond,
    /// 100 ms fast-probe timer, active while disconnecting
    TickFast,
    /// Host answered a channel read
    CurrentChannel(u8),
    /// Host reports whether the broadcast was queued
    SendResult(bool),
    /// Network-update confirm, positive or negative
    Confirm(bool),
    /// Host network-state poll result: currently joined
    NetworkState(bool),
}

/// Actions the caller must perform after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    /// Read the current channel from the host
    ReadChannel,
    /// Broadcast a network-update request for the target channel
    BroadcastUpdate {
        channel: u8,
        update_id: u8,
    },
    /// Instruct the host to leave the network
    LeaveNetwork,
    /// Poll the host network state
    PollNetworkState,
    /// Attempt to rejoin the network
    JoinNetwork,
}

/// The channel-change machine.
#[derive(Debug)]
pub struct ChannelChange {
    state: ChannelState,
    target: u8,
    network_update_id: u8,
    retries: u8,
    timer_secs: u32,
    polls: u8,
    reconnects: u8,
}

impl Default for ChannelChange {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ChannelChange {
    pub fn new(network_update_id: u8) -> Self {
        Self {
            state: ChannelState::Idle,
            target: 0,
            network_update_id,
            retries: 0,
            timer_secs: 0,
            polls: 0,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn network_update_id(&self) -> u8 {
        self.network_update_id
    }

    pub fn is_idle(&self) -> bool {
        self.state == ChannelState::Idle
    }

    /// Kick off a change towards `channel`.
    pub fn start(&mut self, channel: u8) -> Result<()> {
        if !(CHANNEL_MIN..=CHANNEL_MAX).contains(&channel) {
            return Err(NetError::InvalidChannel(channel));
        }
        if self.state != ChannelState::Idle {
            return Err(NetError::Busy(self.state.name()));
        }
        info!("channel change to {} started", channel);
        self.target = channel;
        self.retries = 0;
        self.enter(ChannelState::VerifyChannel);
        Ok(())
    }

    fn enter(&mut self, state: ChannelState) {
        debug!("channel change: {} -> {}", self.state.name(), state.name());
        self.state = state;
        self.timer_secs = 0;
        match state {
            ChannelState::DisconnectingNetwork => self.polls = 0,
            ChannelState::ReconnectNetwork => self.reconnects = 0,
            _ => {}
        }
    }

    /// Advance the machine; returns the actions to perform.
    pub fn step(&mut self, event: ChannelEvent) -> Vec<ChannelAction> {
        match (self.state, event) {
            (ChannelState::Idle, _) => Vec::new(),

            (ChannelState::VerifyChannel, ChannelEvent::TickSecond) => {
                self.timer_secs += 1;
                if self.timer_secs == 1 {
                    vec![ChannelAction::ReadChannel]
                } else {
                    Vec::new()
                }
            }
            (ChannelState::VerifyChannel, ChannelEvent::CurrentChannel(ch)) => {
                if ch == self.target {
                    info!("channel change complete, now on {}", ch);
                    self.enter(ChannelState::Idle);
                    Vec::new()
                } else {
                    self.enter(ChannelState::ChangeChannel);
                    vec![self.broadcast_action()]
                }
            }

            (ChannelState::ChangeChannel, ChannelEvent::SendResult(true)) => {
                self.enter(ChannelState::WaitConfirm);
                Vec::new()
            }
            (ChannelState::ChangeChannel, ChannelEvent::SendResult(false)) => {
                self.retries += 1;
                if self.retries >= BROADCAST_RETRIES {
                    warn!("channel change aborted after {} failed broadcasts", self.retries);
                    self.enter(ChannelState::Idle);
                    Vec::new()
                } else {
                    vec![self.broadcast_action()]
                }
            }

            (ChannelState::WaitConfirm, ChannelEvent::Confirm(true)) => {
                self.enter(ChannelState::DisconnectingNetwork);
                vec![ChannelAction::LeaveNetwork]
            }
            (ChannelState::WaitConfirm, ChannelEvent::Confirm(false)) => {
                self.enter(ChannelState::VerifyChannel);
                Vec::new()
            }
            (ChannelState::WaitConfirm, ChannelEvent::TickSecond) => {
                self.timer_secs += 1;
                if self.timer_secs >= CONFIRM_TIMEOUT_SECS {
                    warn!("network-update confirm timed out");
                    self.enter(ChannelState::VerifyChannel);
                }
                Vec::new()
            }

            (ChannelState::DisconnectingNetwork, ChannelEvent::TickFast) => {
                self.polls += 1;
                if self.polls > DISCONNECT_POLLS {
                    // Still joined after the poll budget; reconnect anyway.
                    self.enter(ChannelState::ReconnectNetwork);
                    vec![ChannelAction::JoinNetwork]
                } else {
                    vec![ChannelAction::PollNetworkState]
                }
            }
            (ChannelState::DisconnectingNetwork, ChannelEvent::NetworkState(false)) => {
                self.enter(ChannelState::ReconnectNetwork);
                vec![ChannelAction::JoinNetwork]
            }
            (ChannelState::DisconnectingNetwork, ChannelEvent::NetworkState(true)) => Vec::new(),

            (ChannelState::ReconnectNetwork, ChannelEvent::NetworkState(true)) => {
                self.enter(ChannelState::VerifyChannel);
                Vec::new()
            }
            (ChannelState::ReconnectNetwork, ChannelEvent::TickSecond) => {
                self.timer_secs += 1;
                if self.timer_secs % RECONNECT_INTERVAL_SECS == 0 {
                    self.reconnects += 1;
                    if self.reconnects >= RECONNECT_ATTEMPTS {
                        warn!("reconnect budget exhausted, giving up channel change");
                        self.enter(ChannelState::Idle);
                        Vec::new()
                    } else {
                        vec![ChannelAction::JoinNetwork]
                    }
                } else {
                    Vec::new()
                }
            }

            _ => Vec::new(),
        }
    }

    fn broadcast_action(&mut self) -> ChannelAction {
        // The update id wraps 255 -> 1; 0 is never used on the air.
        self.network_update_id = match self.network_update_id {
            255 => 1,
            id => id + 1,
        };
        ChannelAction::BroadcastUpdate { channel: self.target, update_id: self.network_update_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive_to_change(machine: &mut ChannelChange) -> Vec<ChannelAction> {
        machine.start(15).unwrap();
        assert_eq!(machine.step(ChannelEvent::TickSecond), vec![ChannelAction::ReadChannel]);
        machine.step(ChannelEvent::CurrentChannel(11))
    }

    #[test]
    fn test_same_channel_returns_to_idle() {
        let mut machine = ChannelChange::new(0);
        machine.start(15).unwrap();
        machine.step(ChannelEvent::TickSecond);
        machine.step(ChannelEvent::CurrentChannel(15));
        assert!(machine.is_idle());
    }

    #[test]
    fn test_invalid_channel_rejected() {
        let mut machine = ChannelChange::new(0);
        assert!(matches!(machine.start(27), Err(NetError::InvalidChannel(27))));
        assert!(machine.is_idle());
    }

    #[test]
    fn test_happy_path() {
        let mut machine = ChannelChange::new(0);
        let actions = drive_to_change(&mut machine);
        assert_eq!(
            actions,
            vec![ChannelAction::BroadcastUpdate { channel: 15, update_id: 1 }]
        );

        machine.step(ChannelEvent::SendResult(true));
        assert_eq!(machine.state(), ChannelState::WaitConfirm);

        let actions = machine.step(ChannelEvent::Confirm(true));
        assert_eq!(actions, vec![ChannelAction::LeaveNetwork]);

        let actions = machine.step(ChannelEvent::NetworkState(false));
        assert_eq!(actions, vec![ChannelAction::JoinNetwork]);

        machine.step(ChannelEvent::NetworkState(true));
        assert_eq!(machine.state(), ChannelState::VerifyChannel);

        machine.step(ChannelEvent::TickSecond);
        machine.step(ChannelEvent::CurrentChannel(15));
        assert!(machine.is_idle());
    }

    #[test]
    fn test_broadcast_retry_budget() {
        let mut machine = ChannelChange::new(0);
        drive_to_change(&mut machine);
        assert!(!machine.step(ChannelEvent::SendResult(false)).is_empty());
        assert!(!machine.step(ChannelEvent::SendResult(false)).is_empty());
        assert!(machine.step(ChannelEvent::SendResult(false)).is_empty());
        assert!(machine.is_idle());
    }

    #[test]
    fn test_confirm_timeout_reverifies() {
        let mut machine = ChannelChange::new(0);
        drive_to_change(&mut machine);
        machine.step(ChannelEvent::SendResult(true));
        for _ in 0..10 {
            machine.step(ChannelEvent::TickSecond);
        }
        assert_eq!(machine.state(), ChannelState::VerifyChannel);
    }

    #[test]
    fn test_update_id_wraps_255_to_1() {
        let mut machine = ChannelChange::new(255);
        drive_to_change(&mut machine);
        assert_eq!(machine.network_update_id(), 1);
    }

    #[test]
    fn test_reconnect_exhaustion_goes_idle() {
        let mut machine = ChannelChange::new(0);
        drive_to_change(&mut machine);
        machine.step(ChannelEvent::SendResult(true));
        machine.step(ChannelEvent::Confirm(true));
        machine.step(ChannelEvent::NetworkState(false));
        // 10 attempts at 5 s intervals, never rejoining.
        for _ in 0..(10 * 5) {
            machine.step(ChannelEvent::TickSecond);
        }
        assert!(machine.is_idle());
    }

    #[test]
    fn test_disconnect_poll_budget() {
        let mut machine = ChannelChange::new(0);
        drive_to_change(&mut machine);
        machine.step(ChannelEvent::SendResult(true));
        machine.step(ChannelEvent::Confirm(true));
        for _ in 0..10 {
            let actions = machine.step(ChannelEvent::TickFast);
            assert_eq!(actions, vec![ChannelAction::PollNetworkState]);
        }
        let actions = machine.step(ChannelEvent::TickFast);
        assert_eq!(actions, vec![ChannelAction::JoinNetwork]);
        assert_eq!(machine.state(), ChannelState::ReconnectNetwork);
    }
}
