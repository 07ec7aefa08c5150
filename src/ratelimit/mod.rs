//! Fixed-window rate limiting over a shared counter store.

mod bucket;
mod limiter;
mod rules;

pub use bucket::{BucketKey, KEY_SEPARATOR};
pub use limiter::{RateLimitError, RateLimiter};
pub use rules::{
    Admission, RateLimiterConfig, WindowMode, DEFAULT_KEY, DEFAULT_MAX_REQUESTS,
    DEFAULT_REFRESH_INTERVAL,
};
