//! In-process counter store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use super::{bounded_ttl, CounterStore, StoreError, TtlRefresh, MAX_TTL};

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: Instant,
}

/// The instant `ttl` from `now`, saturating instead of overflowing.
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(bounded_ttl(ttl))
        .or_else(|| now.checked_add(MAX_TTL / 1000))
        .unwrap_or(now)
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A counter store kept in process memory.
///
/// Suitable for development and single-instance deployments. Expiry follows
/// the tokio clock, so tests can drive it with paused time.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    slots: DashMap<String, Slot>,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired counter. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.is_live(now));
        before - self.slots.len()
    }

    /// Number of counters currently held, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the store holds no counters.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remaining lifetime of the counter for `key`, if it is live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.expires_at - now)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get_counter(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let count = self
            .slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.count)
            .unwrap_or(0);
        Ok(count)
    }

    async fn increase_with_ttl(
        &self,
        key: &str,
        ttl: Duration,
        refresh: TtlRefresh,
    ) -> Result<u64, StoreError> {
        let now = Instant::now();
        let expires_at = expiry(now, ttl);
        let fresh = Slot {
            count: 0,
            expires_at,
        };

        // The entry guard holds the shard lock, making read-modify-write atomic.
        let mut slot = self.slots.entry(key.to_string()).or_insert(fresh);
        if !slot.is_live(now) {
            *slot = fresh;
        }
        slot.count += 1;
        if slot.count == 1 || refresh == TtlRefresh::Always {
            slot.expires_at = expires_at;
        }

        trace!(key = %key, count = slot.count, "Incremented in-memory counter");
        Ok(slot.count)
    }
}
