//! Ring internals.
//!
//! The ring is an ordered set of `(position, address)` pairs. Making the
//! address part of the ordering key gives two properties for free: replica
//! points that collide on a position coexist instead of clobbering each
//! other, and lookup ties at a position break lexicographically by address,
//! the same on every node.

use std::collections::{BTreeSet, HashSet};
use std::sync::RwLock;

use crate::membership::types::MemberAddr;

/// 32-bit ring position for arbitrary bytes.
fn hash32(bytes: &[u8]) -> u32 {
    wyhash::wyhash(bytes, 0) as u32
}

struct Inner {
    points: BTreeSet<(u32, MemberAddr)>,
    servers: HashSet<MemberAddr>,
}

pub struct HashRing {
    inner: RwLock<Inner>,
    replica_points: u32,
}

impl HashRing {
    pub fn new(replica_points: u32) -> Self {
        Self {
            inner: RwLock::new(Inner {
                points: BTreeSet::new(),
                servers: HashSet::new(),
            }),
            replica_points: replica_points.max(1),
        }
    }

    /// Insert a server and its replica points. Returns whether the server
    /// set actually changed, so callers can suppress spurious ring events.
    pub fn add_server(&self, address: &MemberAddr) -> bool {
        let mut inner = self.inner.write().unwrap();
        if !inner.servers.insert(address.clone()) {
            return false;
        }
        for replica in 0..self.replica_points {
            let position = hash32(format!("{}{}", address, replica).as_bytes());
            inner.points.insert((position, address.clone()));
        }
        true
    }

    /// Remove a server and all of its replica points. Idempotent; returns
    /// whether the server set actually changed.
    pub fn remove_server(&self, address: &MemberAddr) -> bool {
        let mut inner = self.inner.write().unwrap();
        if !inner.servers.remove(address) {
            return false;
        }
        for replica in 0..self.replica_points {
            let position = hash32(format!("{}{}", address, replica).as_bytes());
            inner.points.remove(&(position, address.clone()));
        }
        true
    }

    pub fn has_server(&self, address: &MemberAddr) -> bool {
        self.inner.read().unwrap().servers.contains(address)
    }

    pub fn server_count(&self) -> usize {
        self.inner.read().unwrap().servers.len()
    }

    pub fn servers(&self) -> Vec<MemberAddr> {
        let mut servers: Vec<MemberAddr> =
            self.inner.read().unwrap().servers.iter().cloned().collect();
        servers.sort();
        servers
    }

    /// Owner of `key`: the server at the least ring position at or after
    /// `hash(key)`, wrapping around. `None` on an empty ring.
    pub fn lookup(&self, key: &str) -> Option<MemberAddr> {
        let position = hash32(key.as_bytes());
        let inner = self.inner.read().unwrap();
        inner
            .points
            .range((position, MemberAddr::new(""))..)
            .next()
            .or_else(|| inner.points.iter().next())
            .map(|(_, addr)| addr.clone())
    }

    /// Number of replica points currently on the ring. Test support.
    pub fn point_count(&self) -> usize {
        self.inner.read().unwrap().points.len()
    }
}
