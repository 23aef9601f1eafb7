//! Storage traits.

mod community;
mod ledger;
mod media;

pub use community::CommunityStore;
pub use ledger::{LedgerEntry, LedgerInsert, SubmissionLedger};
pub use media::{DEFAULT_PAGE_SIZE, MatchQuery, MatchStream, MediaStore};
