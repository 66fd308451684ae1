//! Pending request-response entries
//!
//! Fire-and-forget commands keep no state. Read-attributes and bind
//! requests register an entry keyed by `(aps request id, ZDP sequence)`;
//! the confirm clears it, the periodic tick reaps entries past their
//! deadline so the caller observes a failure event.

use std::time::{Duration, Instant};

use tracing::debug;

/// Deadline applied to every pending entry.
pub const PENDING_TIMEOUT: Duration = Duration::from_secs(10);

/// What kind of answer the entry waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    ReadAttributes,
    WriteAttributes,
    Bind,
}

/// One in-flight request-response entry.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub aps_req_id: u8,
    /// ZDP sequence number, present for ZDP requests only
    pub zdp_seq: Option<u8>,
    pub kind: PendingKind,
    /// Device key the request went to
    pub device_key: u64,
    deadline: Instant,
}

/// Table of in-flight entries, reaped on the 1 s tick.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: Vec<PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a new in-flight entry with the standard deadline.
    pub fn insert(&mut self, aps_req_id: u8, zdp_seq: Option<u8>, kind: PendingKind, device_key: u64) {
        self.insert_at(aps_req_id, zdp_seq, kind, device_key, Instant::now() + PENDING_TIMEOUT);
    }

    fn insert_at(
        &mut self,
        aps_req_id: u8,
        zdp_seq: Option<u8>,
        kind: PendingKind,
        device_key: u64,
        deadline: Instant,
    ) {
        self.entries.push(PendingEntry { aps_req_id, zdp_seq, kind, device_key, deadline });
    }

    /// Clear and return the entry matching a confirm.
    pub fn confirm(&mut self, aps_req_id: u8, zdp_seq: Option<u8>) -> Option<PendingEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.aps_req_id == aps_req_id && e.zdp_seq == zdp_seq)?;
        Some(self.entries.remove(pos))
    }

    /// Drop and return every entry past its deadline.
    pub fn reap(&mut self, now: Instant) -> Vec<PendingEntry> {
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            if e.deadline <= now {
                debug!(
                    "pending request {} to 0x{:016X} timed out",
                    e.aps_req_id, e.device_key
                );
                expired.push(e.clone());
                false
            } else {
                true
            }
        });
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_clears_entry() {
        let mut table = PendingTable::new();
        table.insert(1, Some(9), PendingKind::Bind, 0xAA);
        table.insert(2, None, PendingKind::ReadAttributes, 0xAA);

        assert!(table.confirm(1, Some(9)).is_some());
        assert!(table.confirm(1, Some(9)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reap_expired_only() {
        let mut table = PendingTable::new();
        let now = Instant::now();
        table.insert_at(1, None, PendingKind::ReadAttributes, 0xAA, now);
        table.insert_at(2, None, PendingKind::ReadAttributes, 0xBB, now + PENDING_TIMEOUT);

        let expired = table.reap(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].aps_req_id, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_zdp_seq_distinguishes_entries() {
        let mut table = PendingTable::new();
        table.insert(1, Some(4), PendingKind::Bind, 0xAA);
        table.insert(1, Some(5), PendingKind::Bind, 0xAA);
        assert!(table.confirm(1, Some(5)).is_some());
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries[0].zdp_seq, Some(4));
    }
}
