//! Batched save scheduling
//!
//! Resource mutations do not hit the database directly. Callers queue a
//! save request tagged with a category and a delay class; requests for the
//! same category coalesce within the delay window and the earliest deadline
//! wins. A global no-save flag suppresses everything during controlled
//! restart so a half-written shutdown never reaches disk.

use std::collections::HashMap;

use tracing::{debug, trace};

/// What part of the gateway state a save request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveCategory {
    Config,
    Devices,
    Sensors,
    Lights,
    Groups,
    Scenes,
    Auth,
    ResourceLinks,
}

impl SaveCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            SaveCategory::Config => "config",
            SaveCategory::Devices => "devices",
            SaveCategory::Sensors => "sensors",
            SaveCategory::Lights => "lights",
            SaveCategory::Groups => "groups",
            SaveCategory::Scenes => "scenes",
            SaveCategory::Auth => "auth",
            SaveCategory::ResourceLinks => "resource-links",
        }
    }
}

/// How soon a queued save must reach disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayClass {
    Short,
    Long,
    Huge,
}

impl DelayClass {
    fn delay_secs(self) -> u32 {
        match self {
            DelayClass::Short => 5,
            DelayClass::Long => 60,
            DelayClass::Huge => 600,
        }
    }
}

/// Per-category coalescing save queue, ticked once a second.
#[derive(Debug, Default)]
pub struct SaveScheduler {
    /// Seconds until each pending category is due.
    pending: HashMap<SaveCategory, u32>,
    no_save: bool,
}

impl SaveScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a save. A request that lands while the same category is
    /// already pending keeps the earlier of the two deadlines.
    pub fn request(&mut self, category: SaveCategory, class: DelayClass) {
        if self.no_save {
            trace!("save suppressed for {}: no-save flag set", category.as_str());
            return;
        }
        let delay = class.delay_secs();
        let entry = self.pending.entry(category).or_insert(delay);
        if delay < *entry {
            *entry = delay;
        }
        trace!("save queued: {} in {}s", category.as_str(), *entry);
    }

    /// Suppress all saves until [`resume`](Self::resume). Pending requests
    /// are discarded.
    pub fn suspend(&mut self) {
        debug!("save scheduler suspended, {} pending dropped", self.pending.len());
        self.pending.clear();
        self.no_save = true;
    }

    pub fn resume(&mut self) {
        debug!("save scheduler resumed");
        self.no_save = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.no_save
    }

    /// True if any category is waiting to be written.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// One-second tick; returns the categories whose window just expired.
    pub fn tick(&mut self) -> Vec<SaveCategory> {
        if self.no_save {
            return Vec::new();
        }
        let mut due = Vec::new();
        self.pending.retain(|category, remaining| {
            if *remaining <= 1 {
                due.push(*category);
                false
            } else {
                *remaining -= 1;
                true
            }
        });
        due
    }

    /// Force every pending category out immediately, e.g. on clean shutdown.
    pub fn flush(&mut self) -> Vec<SaveCategory> {
        self.pending.drain().map(|(category, _)| category).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_save_due_after_window() {
        let mut sched = SaveScheduler::new();
        sched.request(SaveCategory::Lights, DelayClass::Short);
        for _ in 0..4 {
            assert!(sched.tick().is_empty());
        }
        assert_eq!(sched.tick(), vec![SaveCategory::Lights]);
        assert!(!sched.has_pending());
    }

    #[test]
    fn test_earlier_deadline_wins_on_coalesce() {
        let mut sched = SaveScheduler::new();
        sched.request(SaveCategory::Config, DelayClass::Huge);
        sched.request(SaveCategory::Config, DelayClass::Short);
        let mut ticks = 0;
        loop {
            ticks += 1;
            if !sched.tick().is_empty() {
                break;
            }
        }
        assert_eq!(ticks, 5);
    }

    #[test]
    fn test_later_class_does_not_extend_deadline() {
        let mut sched = SaveScheduler::new();
        sched.request(SaveCategory::Groups, DelayClass::Short);
        for _ in 0..3 {
            sched.tick();
        }
        sched.request(SaveCategory::Groups, DelayClass::Long);
        assert!(sched.tick().is_empty());
        assert_eq!(sched.tick(), vec![SaveCategory::Groups]);
    }

    #[test]
    fn test_no_save_flag_suppresses_everything() {
        let mut sched = SaveScheduler::new();
        sched.request(SaveCategory::Sensors, DelayClass::Short);
        sched.suspend();
        sched.request(SaveCategory::Auth, DelayClass::Short);
        for _ in 0..20 {
            assert!(sched.tick().is_empty());
        }
        sched.resume();
        sched.request(SaveCategory::Auth, DelayClass::Short);
        for _ in 0..5 {
            sched.tick();
        }
        assert!(!sched.has_pending());
    }

    #[test]
    fn test_flush_returns_all_pending() {
        let mut sched = SaveScheduler::new();
        sched.request(SaveCategory::Scenes, DelayClass::Huge);
        sched.request(SaveCategory::Auth, DelayClass::Long);
        let mut due = sched.flush();
        due.sort_by_key(|c| c.as_str());
        assert_eq!(due, vec![SaveCategory::Auth, SaveCategory::Scenes]);
        assert!(!sched.has_pending());
    }
}
