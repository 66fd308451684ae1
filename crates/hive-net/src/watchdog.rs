//! Network watchdog and degraded mode
//!
//! Fatal conditions (host link gone, persistence failure, corrupted bundle
//! store) flip the gateway into degraded mode: the API goes read-only and
//! no radio writes leave the process until the condition clears. The
//! watchdog itself counts seconds since the host last showed life.

use tracing::{info, warn};

/// Seconds of host silence before the watchdog declares the link dead.
const HOST_SILENCE_LIMIT_SECS: u32 = 30;

/// Why the gateway is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    HostLinkLost,
    PersistenceFailure,
    BundleStoreCorrupt,
}

impl DegradedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DegradedReason::HostLinkLost => "host-link-lost",
            DegradedReason::PersistenceFailure => "persistence-failure",
            DegradedReason::BundleStoreCorrupt => "bundle-store-corrupt",
        }
    }
}

/// The watchdog plus the degraded-mode latch.
#[derive(Debug, Default)]
pub struct Watchdog {
    silence_secs: u32,
    degraded: Option<DegradedReason>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the gateway must refuse writes.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn reason(&self) -> Option<DegradedReason> {
        self.degraded
    }

    /// Any sign of life from the host: frame, confirm, poll answer.
    pub fn feed(&mut self) {
        self.silence_secs = 0;
        if self.degraded == Some(DegradedReason::HostLinkLost) {
            info!("host link back, leaving degraded mode");
            self.degraded = None;
        }
    }

    /// Enter degraded mode for a non-watchdog reason. A later reason does
    /// not overwrite an earlier one.
    pub fn degrade(&mut self, reason: DegradedReason) {
        if self.degraded.is_none() {
            warn!("entering degraded mode: {}", reason.as_str());
            self.degraded = Some(reason);
        }
    }

    /// Explicit all-clear, e.g. after the persistence layer recovered.
    pub fn clear(&mut self) {
        if self.degraded.is_some() {
            info!("degraded mode cleared");
            self.degraded = None;
        }
        self.silence_secs = 0;
    }

    /// One-second tick; returns true when this tick tripped the watchdog.
    pub fn tick(&mut self) -> bool {
        self.silence_secs += 1;
        if self.silence_secs == HOST_SILENCE_LIMIT_SECS && self.degraded.is_none() {
            self.degrade(DegradedReason::HostLinkLost);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_trips_watchdog_once() {
        let mut wd = Watchdog::new();
        let mut trips = 0;
        for _ in 0..60 {
            if wd.tick() {
                trips += 1;
            }
        }
        assert_eq!(trips, 1);
        assert_eq!(wd.reason(), Some(DegradedReason::HostLinkLost));
    }

    #[test]
    fn test_feed_clears_link_loss() {
        let mut wd = Watchdog::new();
        for _ in 0..30 {
            wd.tick();
        }
        assert!(wd.is_degraded());
        wd.feed();
        assert!(!wd.is_degraded());
    }

    #[test]
    fn test_feed_keeps_other_reasons() {
        let mut wd = Watchdog::new();
        wd.degrade(DegradedReason::PersistenceFailure);
        wd.feed();
        assert!(wd.is_degraded());
        wd.clear();
        assert!(!wd.is_degraded());
    }
}
