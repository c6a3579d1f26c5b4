//! In-flight request tracking.
//!
//! The tracker is the single point that decides who computes a tile. A key
//! is claimed atomically (`entry` on a sharded map, not check-then-insert),
//! so when many paint passes race for the same missing tile exactly one of
//! them wins and submits a job.
//!
//! Every claim gets a claim id that is never reused, so a job that started
//! before `clear_all()` can finish and release its own claim without ever
//! removing a claim made afterwards, however the clear and the new claim
//! interleave.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::region::RegionKey;

/// Concurrent set of pending tile keys.
#[derive(Debug, Default)]
pub struct PendingRequestTracker {
    pending: DashMap<RegionKey, u64>,
    next_claim: AtomicU64,
    clears: AtomicU64,
}

impl PendingRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `true` if this caller won the right to submit a job.
    pub fn try_acquire(&self, key: &RegionKey) -> bool {
        self.acquire(key).is_some()
    }

    /// Claim `key`, returning the id of the new claim.
    pub fn acquire(&self, key: &RegionKey) -> Option<u64> {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let claim = self.next_claim.fetch_add(1, Ordering::Relaxed);
                vacant.insert(claim);
                Some(claim)
            }
        }
    }

    /// Remove `key` regardless of who claimed it.
    pub fn release(&self, key: &RegionKey) {
        self.pending.remove(key);
    }

    /// Remove `key` only if it is still held by `claim`.
    ///
    /// Returns `true` if the claim was removed.
    pub fn release_acquired(&self, key: &RegionKey, claim: u64) -> bool {
        self.pending
            .remove_if(key, |_, held| *held == claim)
            .is_some()
    }

    /// Forget every pending key.
    pub fn clear_all(&self) {
        self.pending.clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_pending(&self, key: &RegionKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of times the tracker has been cleared.
    pub fn clears(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }
}
