//! Submission ledger trait.

use crate::Result;
use crate::models::SubmissionId;
use serde::{Deserialize, Serialize};

/// Outcome of a ledger insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    /// A new entry was written.
    Inserted,
    /// An entry already existed; nothing changed.
    AlreadyPresent,
}

impl LedgerInsert {
    /// Returns true if this call wrote the entry.
    #[must_use]
    pub const fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Submission the entry is for.
    pub submission_id: SubmissionId,
    /// True if a fingerprint was recorded.
    pub processed: bool,
    /// When the entry was written (Unix epoch seconds).
    pub recorded_at: i64,
}

/// Record of every submission already considered.
///
/// Guarantees at most one entry per submission ID, including under concurrent
/// duplicate inserts. A duplicate insert is not an error.
pub trait SubmissionLedger: Send + Sync {
    /// Writes an entry unless one already exists.
    fn insert_entry(&self, id: &SubmissionId, processed: bool) -> Result<LedgerInsert>;

    /// Returns the entry for a submission.
    fn get_entry(&self, id: &SubmissionId) -> Result<Option<LedgerEntry>>;

    /// Returns the number of entries.
    fn entry_count(&self) -> Result<usize>;

    /// Returns true if the submission has an entry.
    fn contains_entry(&self, id: &SubmissionId) -> Result<bool> {
        Ok(self.get_entry(id)?.is_some())
    }
}
