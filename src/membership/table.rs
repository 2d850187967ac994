//! Canonical member table.
//!
//! All mutations funnel through [`Membership::update`], which applies the
//! incarnation/precedence reconciliation rules, refutes false rumors about
//! the local node, and keeps the 32-bit membership checksum in lockstep with
//! the table. Members are created on first observation and never removed:
//! `faulty`/`leave`/`damped` entries persist so reconciliation stays
//! consistent with peers that still carry them.

use rand::seq::SliceRandom;
use std::cmp;
use std::collections::BTreeMap;
use std::hash::Hasher;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use wyhash::WyHash;

use super::types::{Change, Member, MemberAddr, MemberStatus, MembershipUpdate, UpdateKind};

/// Wall-clock milliseconds, used only to seed first incarnations.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct Inner {
    members: BTreeMap<MemberAddr, Member>,
    checksum: u32,
    /// Shuffled probe order over pingable, non-local members, rebuilt on
    /// exhaustion.
    probe_order: Vec<MemberAddr>,
    probe_index: usize,
}

impl Inner {
    fn recompute_checksum(&mut self) {
        self.checksum = checksum_of(self.members.values());
    }
}

/// Deterministic 32-bit hash over sorted `(address, status, incarnation)`
/// triples. Every node must compute the same value for the same member set.
fn checksum_of<'a>(members: impl Iterator<Item = &'a Member>) -> u32 {
    let mut hasher = WyHash::with_seed(0);
    for member in members {
        hasher.write(member.address.0.as_bytes());
        hasher.write_u8(member.status.checksum_tag());
        hasher.write_u64(member.incarnation_number);
    }
    hasher.finish() as u32
}

impl MemberStatus {
    /// Stable per-status byte fed into the checksum.
    fn checksum_tag(self) -> u8 {
        match self {
            MemberStatus::Alive => b'a',
            MemberStatus::Suspect => b's',
            MemberStatus::Faulty => b'f',
            MemberStatus::Leave => b'l',
            MemberStatus::Damped => b'd',
        }
    }
}

pub struct Membership {
    local: MemberAddr,
    inner: Mutex<Inner>,
}

impl Membership {
    pub fn new(local: MemberAddr) -> Self {
        Self {
            local,
            inner: Mutex::new(Inner {
                members: BTreeMap::new(),
                checksum: checksum_of(std::iter::empty()),
                probe_order: Vec::new(),
                probe_index: 0,
            }),
        }
    }

    pub fn local_addr(&self) -> &MemberAddr {
        &self.local
    }

    pub fn local_member(&self) -> Option<Member> {
        self.get(&self.local)
    }

    pub fn get(&self, addr: &MemberAddr) -> Option<Member> {
        self.inner.lock().unwrap().members.get(addr).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn checksum(&self) -> u32 {
        self.inner.lock().unwrap().checksum
    }

    /// Sorted snapshot of the full table, as served to joining nodes.
    pub fn get_state(&self) -> Vec<Member> {
        self.inner.lock().unwrap().members.values().cloned().collect()
    }

    /// Idempotent insert: a known address is left untouched and produces no
    /// update, so `add_member(a); add_member(a)` emits a single `new`.
    pub fn add_member(
        &self,
        address: MemberAddr,
        incarnation_number: Option<u64>,
    ) -> Vec<MembershipUpdate> {
        if self.get(&address).is_some() {
            return Vec::new();
        }
        let incarnation = incarnation_number.unwrap_or_else(now_ms);
        let source = Some(self.local.clone());
        self.update(&[Change::new(address, MemberStatus::Alive, incarnation, source)])
    }

    pub fn make_alive(&self, address: MemberAddr, incarnation: u64) -> Vec<MembershipUpdate> {
        self.make(address, MemberStatus::Alive, incarnation)
    }

    pub fn make_suspect(&self, address: MemberAddr, incarnation: u64) -> Vec<MembershipUpdate> {
        self.make(address, MemberStatus::Suspect, incarnation)
    }

    pub fn make_faulty(&self, address: MemberAddr, incarnation: u64) -> Vec<MembershipUpdate> {
        self.make(address, MemberStatus::Faulty, incarnation)
    }

    pub fn make_leave(&self, address: MemberAddr, incarnation: u64) -> Vec<MembershipUpdate> {
        self.make(address, MemberStatus::Leave, incarnation)
    }

    pub fn make_damped(&self, address: MemberAddr, incarnation: u64) -> Vec<MembershipUpdate> {
        self.make(address, MemberStatus::Damped, incarnation)
    }

    fn make(
        &self,
        address: MemberAddr,
        status: MemberStatus,
        incarnation: u64,
    ) -> Vec<MembershipUpdate> {
        let source = Some(self.local.clone());
        self.update(&[Change::new(address, status, incarnation, source)])
    }

    /// Reconcile a batch of proposed changes in input order and return the
    /// updates actually applied. The checksum is recomputed under the same
    /// lock, so readers never observe a table/checksum mismatch.
    pub fn update(&self, changes: &[Change]) -> Vec<MembershipUpdate> {
        let mut inner = self.inner.lock().unwrap();
        let mut applied = Vec::new();

        for change in changes {
            if let Some(update) = self.reconcile(&mut inner, change) {
                applied.push(update);
            }
        }

        if !applied.is_empty() {
            inner.recompute_checksum();
        }
        applied
    }

    fn reconcile(&self, inner: &mut Inner, change: &Change) -> Option<MembershipUpdate> {
        // A demoting rumor about ourselves is never accepted: we restate
        // alive at a bumped incarnation so the refutation outraces the rumor.
        if change.address == self.local
            && matches!(change.status, MemberStatus::Suspect | MemberStatus::Faulty)
        {
            let local = inner.members.get_mut(&self.local)?;
            if change.incarnation_number < local.incarnation_number {
                return None;
            }
            local.incarnation_number =
                cmp::max(local.incarnation_number, change.incarnation_number) + 1;
            local.status = MemberStatus::Alive;
            return Some(MembershipUpdate {
                kind: UpdateKind::Alive,
                member: local.clone(),
                source: Some(self.local.clone()),
            });
        }

        if let Some(existing) = inner.members.get_mut(&change.address) {
            let newer = change.incarnation_number > existing.incarnation_number;
            let overrides = change.incarnation_number == existing.incarnation_number
                && change.status.precedence() > existing.status.precedence();
            if !(newer || overrides) {
                return None;
            }
            existing.status = change.status;
            existing.incarnation_number = change.incarnation_number;
            return Some(MembershipUpdate {
                kind: change.status.into(),
                member: existing.clone(),
                source: change.source.clone(),
            });
        }

        // First observation of this address.
        let member = Member::new(
            change.address.clone(),
            change.status,
            change.incarnation_number,
        );
        inner.members.insert(change.address.clone(), member.clone());
        Some(MembershipUpdate {
            kind: UpdateKind::New,
            member,
            source: change.source.clone(),
        })
    }

    /// Uniform sample of up to `n` pingable members, minus the excluded
    /// addresses. Fewer than `n` may be returned.
    pub fn get_random_pingable_members(
        &self,
        n: usize,
        exclude: &[MemberAddr],
    ) -> Vec<Member> {
        let inner = self.inner.lock().unwrap();
        let mut candidates: Vec<Member> = inner
            .members
            .values()
            .filter(|m| m.status.is_pingable())
            .filter(|m| m.address != self.local && !exclude.contains(&m.address))
            .cloned()
            .collect();
        drop(inner);

        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(n);
        candidates
    }

    /// Round-robin probe target selection: walk a shuffled order of
    /// pingable, non-local members, reshuffling on exhaustion so every
    /// member is visited once per sweep.
    pub fn next_probe_target(&self) -> Option<Member> {
        let mut inner = self.inner.lock().unwrap();

        // Two passes at most: the current order, then a fresh shuffle that
        // picks up joins and drops departed members.
        for _ in 0..2 {
            while inner.probe_index < inner.probe_order.len() {
                let addr = inner.probe_order[inner.probe_index].clone();
                inner.probe_index += 1;
                match inner.members.get(&addr) {
                    Some(m) if m.status.is_pingable() && m.address != self.local => {
                        return Some(m.clone());
                    }
                    _ => continue,
                }
            }

            let mut order: Vec<MemberAddr> = inner
                .members
                .values()
                .filter(|m| m.status.is_pingable() && m.address != self.local)
                .map(|m| m.address.clone())
                .collect();
            if order.is_empty() {
                return None;
            }
            order.shuffle(&mut rand::thread_rng());
            inner.probe_order = order;
            inner.probe_index = 0;
        }
        None
    }

    /// Recompute the checksum from scratch, bypassing the cached value.
    /// Test support for the checksum-is-a-pure-function invariant.
    pub fn compute_checksum(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        checksum_of(inner.members.values())
    }
}
