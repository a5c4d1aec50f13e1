//! Offline cache worker: versioned response caching with a cache-first
//! fetch strategy.
//!
//! This module runs independently of the state store. It reacts to lifecycle
//! steps (install, activate) and to fetch events, sharing no memory with the
//! rest of the application beyond the durable cache store abstraction:
//! - install populates one cache generation from a fixed core-asset manifest
//! - activate deletes every superseded generation
//! - fetch serves cached GET responses, caches same-origin hits
//!   opportunistically, and degrades to an offline placeholder

mod fetch;
mod store;
mod worker;

pub use fetch::{Fetch, HttpFetch};
pub use store::{CacheStore, CachedResponse, SqliteCacheStore};
pub use worker::{spawn, CacheHandle, CacheWorker, Lifecycle};
