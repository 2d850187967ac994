//! Suspicion timer set.
//!
//! A member entering `suspect` gets one grace window to refute the rumor.
//! Each window is a one-shot tokio task; expiry pushes the address and the
//! incarnation it was suspected at onto a channel, and the gossip service's
//! reaper converts the member to `faulty` if it is still suspect. Starting a
//! timer for an address that already has one aborts the old task, so the
//! latest start always wins.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::MemberAddr;

pub struct SuspicionSet {
    timers: DashMap<MemberAddr, JoinHandle<()>>,
    enabled: AtomicBool,
    timeout: Duration,
    expired_tx: mpsc::UnboundedSender<(MemberAddr, u64)>,
}

impl SuspicionSet {
    /// Returns the set and the receiver the reaper consumes expirations from.
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<(MemberAddr, u64)>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        (
            Self {
                timers: DashMap::new(),
                enabled: AtomicBool::new(true),
                timeout,
                expired_tx,
            },
            expired_rx,
        )
    }

    /// Arm (or re-arm) the timer for `address`, suspected at `incarnation`.
    pub fn start(&self, address: MemberAddr, incarnation: u64) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let tx = self.expired_tx.clone();
        let timeout = self.timeout;
        let addr = address.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send((addr, incarnation));
        });
        if let Some(previous) = self.timers.insert(address, handle) {
            previous.abort();
        }
    }

    /// Disarm the timer for `address`, if any. Called whenever the member
    /// moves out of `suspect` and after an expiry has been reaped.
    pub fn cancel(&self, address: &MemberAddr) {
        if let Some((_, handle)) = self.timers.remove(address) {
            handle.abort();
        }
    }

    pub fn is_pending(&self, address: &MemberAddr) -> bool {
        self.timers
            .get(address)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Abort every timer and refuse new ones, for leave/destroy.
    pub fn stop_all(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let addrs: Vec<MemberAddr> = self.timers.iter().map(|e| e.key().clone()).collect();
        for addr in addrs {
            if let Some((_, handle)) = self.timers.remove(&addr) {
                handle.abort();
            }
        }
    }

    /// Accept timers again after a rejoin.
    pub fn reenable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }
}
