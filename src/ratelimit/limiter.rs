//! Core rate limiter implementation.

use std::sync::Arc;

use thiserror::Error;

use super::bucket::BucketKey;
use super::rules::{Admission, RateLimiterConfig};
use crate::store::{CounterStore, StoreError};

/// Outcome of a denied or failed check.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The bucket has used up its requests for the current window
    #[error("max requests limit reached")]
    TooManyRequests,

    /// The counter store failed; the decision is unknown
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RateLimitError {
    /// Whether this is a denial rather than a store failure.
    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, RateLimitError::TooManyRequests)
    }
}

/// A fixed-window rate limiter over a shared counter store.
///
/// The limiter holds no mutable state of its own: every counter lives in the
/// store, which may be shared by any number of limiters and processes.
/// Checks never retry and never log; failures go back to the caller as is.
pub struct RateLimiter<S: ?Sized = dyn CounterStore> {
    /// Backing counter store
    store: Arc<S>,
    /// Resolved configuration
    config: RateLimiterConfig,
}

impl<S: CounterStore + ?Sized> RateLimiter<S> {
    /// Create a rate limiter.
    ///
    /// An empty `config` (see [`RateLimiterConfig::is_empty`]) is replaced by
    /// the default of 10 requests per minute on bucket `default`. The store is
    /// not contacted.
    pub fn new(store: Arc<S>, config: RateLimiterConfig) -> Self {
        Self {
            store,
            config: config.resolve(),
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The bucket key checked by [`RateLimiter::check`].
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey::from_items(&self.config.key_items)
    }

    /// Count one request against the bucket named by `key_items`.
    ///
    /// Returns `Ok(())` if the request is admitted,
    /// [`RateLimitError::TooManyRequests`] once the bucket has reached the
    /// limit for this window, or [`RateLimitError::Store`] if the store
    /// failed. Dropping the returned future abandons the in-flight store call.
    pub async fn check_request<K: AsRef<str>>(&self, key_items: &[K]) -> Result<(), RateLimitError> {
        let key = BucketKey::from_items(key_items);
        self.check_bucket(&key).await
    }

    /// Count one request against the bucket built from the configured key items.
    pub async fn check(&self) -> Result<(), RateLimitError> {
        let key = self.bucket_key();
        self.check_bucket(&key).await
    }

    async fn check_bucket(&self, key: &BucketKey) -> Result<(), RateLimitError> {
        match self.config.admission {
            Admission::CheckThenIncrement => self.check_then_increment(key).await,
            Admission::IncrementFirst => self.increment_first(key).await,
        }
    }

    async fn check_then_increment(&self, key: &BucketKey) -> Result<(), RateLimitError> {
        let current = self.store.get_counter(key.as_str()).await?;
        if current >= self.config.max_requests {
            return Err(RateLimitError::TooManyRequests);
        }

        self.increment(key).await?;
        Ok(())
    }

    async fn increment_first(&self, key: &BucketKey) -> Result<(), RateLimitError> {
        let count = self.increment(key).await?;
        if count > self.config.max_requests {
            return Err(RateLimitError::TooManyRequests);
        }
        Ok(())
    }

    async fn increment(&self, key: &BucketKey) -> Result<u64, StoreError> {
        self.store
            .increase_with_ttl(
                key.as_str(),
                self.config.refresh_interval,
                self.config.window_mode.ttl_refresh(),
            )
            .await
    }
}
