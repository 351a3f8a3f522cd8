//! Offline-tolerant cache of a tutor's booked sessions.
//!
//! - [`cache`]: durable per-tutor storage with whole-partition replacement
//! - [`remote`]: the HTTP source of truth and its error classification
//! - [`sync`]: the controller that reconciles the two under flaky connectivity
//! - [`connectivity`]: network reachability tracking

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod remote;
pub mod sync;
