//! Rate limiter configuration and policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::TtlRefresh;

/// Bucket key used when the default configuration is installed.
pub const DEFAULT_KEY: &str = "default";
/// Requests allowed per window in the default configuration.
pub const DEFAULT_MAX_REQUESTS: u64 = 10;
/// Window length in the default configuration.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// How a bucket's expiry behaves as requests are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// The TTL is set when the bucket is created and never moved, so the
    /// counter resets a fixed interval after the first counted request.
    #[default]
    Fixed,
    /// Every counted request pushes the expiry forward. A bucket under
    /// steady traffic never resets.
    Sliding,
}

impl WindowMode {
    /// The store-level TTL behavior for this mode.
    pub fn ttl_refresh(self) -> TtlRefresh {
        match self {
            WindowMode::Fixed => TtlRefresh::OnCreate,
            WindowMode::Sliding => TtlRefresh::Always,
        }
    }
}

/// Order of the read and the increment in a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Read the counter, then increment only if under the limit.
    ///
    /// Saturated buckets are never written, but concurrent checks that read
    /// the same value can both be admitted.
    #[default]
    CheckThenIncrement,
    /// Increment first and admit only if the returned value is within the
    /// limit. Admitted requests never exceed the limit; denied requests
    /// still count until the window expires.
    IncrementFirst,
}

/// Configuration of a single rate limiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Items joined into the bucket key for [`RateLimiter::check`](super::RateLimiter::check)
    pub key_items: Vec<String>,
    /// Requests allowed per window
    pub max_requests: u64,
    /// Window length, applied as the counter TTL.
    ///
    /// Stores clamp it to [`MIN_TTL`](crate::store::MIN_TTL) and
    /// [`MAX_TTL`](crate::store::MAX_TTL), so a zero interval counts for one
    /// millisecond and very long intervals last 100 years.
    pub refresh_interval: Duration,
    /// Expiry behavior of the counter
    pub window_mode: WindowMode,
    /// Read/increment ordering
    pub admission: Admission,
}

impl RateLimiterConfig {
    /// Create a configuration with the given limits and default policies.
    pub fn new(key_items: Vec<String>, max_requests: u64, refresh_interval: Duration) -> Self {
        Self {
            key_items,
            max_requests,
            refresh_interval,
            ..Self::default()
        }
    }

    /// The default configuration: bucket `default`, 10 requests per minute.
    pub fn default_limits() -> Self {
        Self::new(
            vec![DEFAULT_KEY.to_string()],
            DEFAULT_MAX_REQUESTS,
            DEFAULT_REFRESH_INTERVAL,
        )
    }

    /// Set the window mode.
    pub fn with_window_mode(mut self, mode: WindowMode) -> Self {
        self.window_mode = mode;
        self
    }

    /// Set the admission policy.
    pub fn with_admission(mut self, admission: Admission) -> Self {
        self.admission = admission;
        self
    }

    /// Whether this configuration was left unset.
    ///
    /// Only a configuration whose key items, request limit and interval are
    /// all zero-valued counts as empty. A caller-supplied limit without key
    /// items is kept as is. Policies do not participate.
    pub fn is_empty(&self) -> bool {
        self.key_items.is_empty() && self.max_requests == 0 && self.refresh_interval.is_zero()
    }

    /// Replace the key items and limits with the defaults, keeping policies.
    pub fn set_default(&mut self) {
        let defaults = Self::default_limits();
        self.key_items = defaults.key_items;
        self.max_requests = defaults.max_requests;
        self.refresh_interval = defaults.refresh_interval;
    }

    /// This configuration, or the defaults if it is empty.
    pub fn resolve(mut self) -> Self {
        if self.is_empty() {
            self.set_default();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_config_is_empty() {
        assert!(RateLimiterConfig::default().is_empty());
    }

    #[test]
    fn test_config_with_keys_is_not_empty() {
        let config = RateLimiterConfig {
            key_items: vec!["key1".to_string()],
            ..RateLimiterConfig::default()
        };
        assert!(!config.is_empty());
    }

    #[test]
    fn test_config_with_max_requests_but_no_keys_is_not_empty() {
        let config = RateLimiterConfig {
            max_requests: 20,
            ..RateLimiterConfig::default()
        };
        assert!(!config.is_empty());
    }

    #[test]
    fn test_config_with_interval_and_max_requests_but_no_keys_is_not_empty() {
        let config = RateLimiterConfig::new(Vec::new(), 15, Duration::from_secs(120));
        assert!(!config.is_empty());
    }

    #[test]
    fn test_policies_do_not_affect_emptiness() {
        let config = RateLimiterConfig::default()
            .with_window_mode(WindowMode::Sliding)
            .with_admission(Admission::IncrementFirst);
        assert!(config.is_empty());
    }

    #[test]
    fn test_set_default_overwrites_limits() {
        let mut config = RateLimiterConfig::new(
            vec!["one".to_string(), "two".to_string()],
            34,
            Duration::from_secs(1),
        )
        .with_window_mode(WindowMode::Sliding);

        config.set_default();

        assert_eq!(config.key_items, vec![DEFAULT_KEY.to_string()]);
        assert_eq!(config.max_requests, DEFAULT_MAX_REQUESTS);
        assert_eq!(config.refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(config.window_mode, WindowMode::Sliding);
    }

    #[test]
    fn test_resolve_keeps_non_empty_config() {
        let config = RateLimiterConfig::new(Vec::new(), 3, Duration::from_secs(5));
        assert_eq!(config.clone().resolve(), config);
    }

    #[test]
    fn test_resolve_installs_defaults() {
        let resolved = RateLimiterConfig::default().resolve();
        assert_eq!(resolved, RateLimiterConfig::default_limits());
        assert_eq!(resolved.refresh_interval, Duration::from_secs(60));
        assert_eq!(resolved.max_requests, 10);
    }

    #[test]
    fn test_window_mode_ttl_refresh() {
        assert_eq!(WindowMode::Fixed.ttl_refresh(), TtlRefresh::OnCreate);
        assert_eq!(WindowMode::Sliding.ttl_refresh(), TtlRefresh::Always);
    }

    #[test]
    fn test_policy_names_parse() {
        let mode: WindowMode = serde_yaml::from_str("sliding").unwrap();
        assert_eq!(mode, WindowMode::Sliding);

        let admission: Admission = serde_yaml::from_str("increment_first").unwrap();
        assert_eq!(admission, Admission::IncrementFirst);
    }
}
