//! Durable local cache of booked sessions.
//!
//! Records are grouped by partition key (tutor id). A partition is only ever
//! replaced as a whole, inside one transaction, so readers never observe a
//! half-written partition.

mod cell;
mod storage;
mod traits;

pub use cell::StoreCell;
pub use storage::{NoopSessionStore, SqliteSessionStore};
pub use traits::{CachedRecord, SessionStore};
