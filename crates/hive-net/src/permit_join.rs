//! Permit-join broadcaster
//!
//! A countdown in seconds. While running, the permit-join request is
//! re-broadcast to all routers roughly every 50 s so router caches never
//! expire mid-window; reaching zero emits the disabled notification exactly
//! once. An API reset mid-countdown forces an immediate re-broadcast.

use tracing::info;

/// Seconds between re-broadcasts while the countdown runs.
const REBROADCAST_INTERVAL_SECS: u32 = 50;

/// Margin added to the broadcast duration so router caches outlive the
/// next re-broadcast.
const BROADCAST_MARGIN_SECS: u32 = 5;

/// Actions the caller performs after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitJoinAction {
    /// Broadcast permit-join with this duration (seconds, clamped to u8)
    Broadcast(u8),
    /// The window closed; notify clients exactly once
    Disabled,
}

/// The permit-join countdown.
#[derive(Debug, Default)]
pub struct PermitJoin {
    remaining_secs: u32,
    since_broadcast: u32,
}

impl PermitJoin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds left in the window.
    pub fn remaining(&self) -> u32 {
        self.remaining_secs
    }

    pub fn is_open(&self) -> bool {
        self.remaining_secs > 0
    }

    /// Reset the countdown; always forces an immediate re-broadcast, also
    /// for duration zero (which closes the network on the routers).
    pub fn set(&mut self, duration_secs: u32) -> Vec<PermitJoinAction> {
        info!("permit join set to {} s", duration_secs);
        self.remaining_secs = duration_secs;
        self.since_broadcast = 0;
        let mut actions = vec![PermitJoinAction::Broadcast(self.broadcast_duration())];
        if duration_secs == 0 {
            actions.push(PermitJoinAction::Disabled);
        }
        actions
    }

    /// One-second tick.
    pub fn tick(&mut self) -> Vec<PermitJoinAction> {
        if self.remaining_secs == 0 {
            return Vec::new();
        }
        self.remaining_secs -= 1;
        if self.remaining_secs == 0 {
            info!("permit join window closed");
            return vec![PermitJoinAction::Broadcast(0), PermitJoinAction::Disabled];
        }
        self.since_broadcast += 1;
        if self.since_broadcast >= REBROADCAST_INTERVAL_SECS {
            self.since_broadcast = 0;
            return vec![PermitJoinAction::Broadcast(self.broadcast_duration())];
        }
        Vec::new()
    }

    /// Duration to put on the air: bounded by the re-broadcast interval
    /// plus margin, and by what is left of the window.
    fn broadcast_duration(&self) -> u8 {
        self.remaining_secs
            .min(REBROADCAST_INTERVAL_SECS + BROADCAST_MARGIN_SECS)
            .min(u32::from(u8::MAX)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_fires_exactly_once() {
        let mut pj = PermitJoin::new();
        pj.set(60);
        let mut disabled = 0;
        for _ in 0..120 {
            for action in pj.tick() {
                if action == PermitJoinAction::Disabled {
                    disabled += 1;
                }
            }
        }
        assert_eq!(disabled, 1);
        assert_eq!(pj.remaining(), 0);
    }

    #[test]
    fn test_rebroadcast_interval() {
        let mut pj = PermitJoin::new();
        pj.set(254);
        let mut broadcasts = 0;
        for _ in 0..100 {
            for action in pj.tick() {
                if matches!(action, PermitJoinAction::Broadcast(_)) {
                    broadcasts += 1;
                }
            }
        }
        assert_eq!(broadcasts, 2);
    }

    #[test]
    fn test_broadcast_duration_clamped() {
        let mut pj = PermitJoin::new();
        let actions = pj.set(600);
        assert_eq!(actions, vec![PermitJoinAction::Broadcast(55)]);

        // A short window broadcasts only what is left.
        let actions = pj.set(10);
        assert_eq!(actions, vec![PermitJoinAction::Broadcast(10)]);
    }

    #[test]
    fn test_reset_mid_countdown_rebroadcasts() {
        let mut pj = PermitJoin::new();
        pj.set(60);
        for _ in 0..30 {
            pj.tick();
        }
        let actions = pj.set(60);
        assert_eq!(actions.len(), 1);
        assert_eq!(pj.remaining(), 60);
    }

    #[test]
    fn test_set_zero_closes_immediately() {
        let mut pj = PermitJoin::new();
        pj.set(60);
        let actions = pj.set(0);
        assert!(actions.contains(&PermitJoinAction::Broadcast(0)));
        assert!(actions.contains(&PermitJoinAction::Disabled));
        assert!(!pj.is_open());
    }
}
