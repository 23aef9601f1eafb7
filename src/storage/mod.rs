//! Storage layer.
//!
//! Three concerns, one trait each:
//! - **Communities** ([`CommunityStore`]): the monitored set and its indexing flag
//! - **Ledger** ([`SubmissionLedger`]): every submission already considered
//! - **Corpus** ([`MediaStore`]): append-only fingerprints, streamed for matching
//!
//! [`SqliteStore`] implements all three over a single database.

// Connection guards live for the whole closure passed to `run`.
#![allow(clippy::significant_drop_tightening)]

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    CommunityStore, DEFAULT_PAGE_SIZE, LedgerEntry, LedgerInsert, MatchQuery, MatchStream,
    MediaStore, SubmissionLedger,
};
