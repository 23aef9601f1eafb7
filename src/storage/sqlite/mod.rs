//! `SQLite` storage backend.
//!
//! ## Module Structure
//!
//! - [`connection`]: lock acquisition with poison recovery, connection pragmas,
//!   immediate transactions
//! - [`metrics`]: per-operation counters and latency histograms
//! - `store`: [`SqliteStore`], implementing every storage trait

mod connection;
mod metrics;
mod store;

pub use connection::{
    BUSY_TIMEOUT_MS, acquire_lock, configure_connection, with_immediate_transaction,
};
pub use self::metrics::{BACKEND, record_operation_metrics, status_of};
pub use store::SqliteStore;
