//! Synchronization of the cached session list with the remote source.
//!
//! The controller publishes a [`SyncState`] on every transition:
//! - cached rows are shown first, flagged stale when offline
//! - online, the full remote set is fetched with backoff and filtered to the
//!   requested tutor, then replaces the cached partition
//! - a failed fetch never touches cached rows; it only marks them stale
//! - reconnecting refreshes stale data after a short settle delay

mod controller;
mod filter;
mod retry;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{SyncController, SyncOptions};
pub use filter::filter_for_partition;
pub use retry::{retry_with_backoff, RetryPolicy, MAX_RETRY_DELAY};
pub use state::SyncState;
