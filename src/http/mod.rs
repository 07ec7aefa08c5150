//! HTTP front end for the rate limiter.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, CheckParams, RATE_LIMITER_PATH};
