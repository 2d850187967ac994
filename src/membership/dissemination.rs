//! Infection-style dissemination buffer.
//!
//! Holds the most recent accepted change per address and piggybacks a
//! bounded batch on every outgoing protocol message. A change is forwarded
//! at most `max_piggyback_count` times, a cap that scales logarithmically
//! with cluster size so every node hears every change with high probability.

use std::collections::HashMap;
use std::sync::Mutex;

use super::types::{Change, MemberAddr};

/// Multiplier on `ceil(log2(n + 1))` when sizing the piggyback cap.
const PIGGYBACK_FACTOR: u32 = 2;

struct Inner {
    changes: HashMap<MemberAddr, Change>,
    max_piggyback_count: u32,
}

pub struct Dissemination {
    inner: Mutex<Inner>,
}

impl Default for Dissemination {
    fn default() -> Self {
        Self::new()
    }
}

impl Dissemination {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                changes: HashMap::new(),
                max_piggyback_count: compute_max_piggyback(1),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_piggyback_count(&self) -> u32 {
        self.inner.lock().unwrap().max_piggyback_count
    }

    /// Buffer an accepted change for dissemination, restarting the piggyback
    /// count and replacing any prior entry for the same address.
    pub fn record(&self, mut change: Change) {
        change.piggyback_count = 0;
        let mut inner = self.inner.lock().unwrap();
        inner.changes.insert(change.address.clone(), change);
    }

    /// Select the piggyback batch for one outgoing message to `peer`.
    ///
    /// `peer_checksum` is the membership checksum the peer reported, when
    /// known (inbound requests carry it; outbound pings pass `None`). If it
    /// matches `local_checksum` the views agree and nothing is sent.
    /// Otherwise the least-disseminated changes go first, entries sourced
    /// from the peer itself are skipped, and every returned entry has its
    /// piggyback count advanced, leaving the buffer once it hits the cap.
    pub fn get_changes(
        &self,
        peer_checksum: Option<u32>,
        local_checksum: u32,
        peer: &MemberAddr,
    ) -> Vec<Change> {
        if peer_checksum == Some(local_checksum) {
            return Vec::new();
        }

        let mut inner = self.inner.lock().unwrap();
        let cap = inner.max_piggyback_count;

        let mut eligible: Vec<MemberAddr> = inner
            .changes
            .values()
            .filter(|c| c.source.as_ref() != Some(peer))
            .map(|c| c.address.clone())
            .collect();
        eligible.sort_by_key(|addr| inner.changes[addr].piggyback_count);
        eligible.truncate(cap as usize);

        let mut batch = Vec::with_capacity(eligible.len());
        for addr in eligible {
            if let Some(change) = inner.changes.get_mut(&addr) {
                batch.push(change.clone());
                change.piggyback_count += 1;
                if change.piggyback_count >= cap {
                    inner.changes.remove(&addr);
                }
            }
        }
        batch
    }

    /// Recompute the piggyback cap for the given member count. Returns the
    /// new cap only when it actually moved, so callers can surface the
    /// adjustment exactly once per real change.
    pub fn adjust_max_piggyback(&self, member_count: usize) -> Option<u32> {
        let mut inner = self.inner.lock().unwrap();
        let next = compute_max_piggyback(member_count);
        if next == inner.max_piggyback_count {
            return None;
        }
        inner.max_piggyback_count = next;
        Some(next)
    }

    /// Current buffered change for an address, if any. Test support.
    pub fn get(&self, addr: &MemberAddr) -> Option<Change> {
        self.inner.lock().unwrap().changes.get(addr).cloned()
    }
}

fn compute_max_piggyback(member_count: usize) -> u32 {
    let n = member_count as f64;
    ((n + 1.0).log2().ceil() as u32).max(1) * PIGGYBACK_FACTOR
}

#[cfg(test)]
mod tests {
    use super::compute_max_piggyback;

    #[test]
    fn cap_scales_logarithmically() {
        assert_eq!(compute_max_piggyback(1), 2);
        assert_eq!(compute_max_piggyback(3), 4);
        assert_eq!(compute_max_piggyback(7), 6);
        assert_eq!(compute_max_piggyback(15), 8);
        // The cap never collapses to zero, even for an empty table.
        assert_eq!(compute_max_piggyback(0), 2);
    }
}
