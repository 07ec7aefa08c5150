//! Windowgate - Distributed Fixed-Window Rate Limiter
//!
//! This crate answers one question per call: has the caller identified by a
//! composite key used up its N requests for the current time window? Counters
//! live in a shared store with atomic increment and TTL expiry (Redis in
//! production), so any number of service instances enforce the same limits.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
