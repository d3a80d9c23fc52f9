//! Adaptive feed refresh scheduling with per-domain rate limiting.
//!
//! - [`scheduler`] decides which feeds are due, fetches them through a bounded
//!   worker pool and applies the results
//! - [`feed`] holds the fetch and parse seams and their HTTP / `feed-rs`
//!   implementations
//! - [`storage`] persists feeds and articles (SQLite or in memory)
//! - [`config`] loads the daemon's TOML configuration

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
