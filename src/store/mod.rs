//! Counter stores backing the rate limiter.
//!
//! A counter store is an external key-value service with an atomic
//! increment and TTL expiry. The limiter only talks to it through the
//! [`CounterStore`] trait, so the same limiter can run against Redis in
//! production and an in-process map in tests.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryCounterStore;
pub use self::redis::RedisCounterStore;

/// Errors surfaced by a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The Redis backend rejected or failed a command
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A store command did not complete within its deadline
    #[error("store command timed out after {0:?}")]
    Timeout(Duration),

    /// Any other backend failure
    #[error("store error: {0}")]
    Backend(String),
}

/// Shortest expiry a store applies; shorter TTLs are rounded up to it.
pub const MIN_TTL: Duration = Duration::from_millis(1);
/// Longest expiry a store applies; longer TTLs are capped to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Clamp a requested TTL into `[MIN_TTL, MAX_TTL]`.
pub fn bounded_ttl(ttl: Duration) -> Duration {
    ttl.clamp(MIN_TTL, MAX_TTL)
}

/// When an increment applies the counter's TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlRefresh {
    /// Only when the increment creates the counter (0 -> 1).
    OnCreate,
    /// On every increment, pushing the expiry forward each time.
    Always,
}

/// Capability set the rate limiter needs from its backing store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter for `key`.
    ///
    /// An absent (or expired) key reads as `0`; backend "not found"
    /// responses must never surface as errors.
    async fn get_counter(&self, key: &str) -> Result<u64, StoreError>;

    /// Atomically increment the counter for `key` and apply `ttl` according
    /// to `refresh`. Returns the value after the increment.
    ///
    /// Implementations clamp `ttl` with [`bounded_ttl`].
    async fn increase_with_ttl(
        &self,
        key: &str,
        ttl: Duration,
        refresh: TtlRefresh,
    ) -> Result<u64, StoreError>;
}
