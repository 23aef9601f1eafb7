//! Process-lifetime set of submissions not to retry.

use crate::models::SubmissionId;
use std::collections::HashSet;
use std::sync::RwLock;

/// Submissions whose processing failed during this run.
///
/// A submission lands here when its media could not be fetched or decoded.
/// It is skipped for the rest of the process lifetime; a restart clears the
/// set, but the ledger entry written on failure still prevents reprocessing.
///
/// # Lock Poisoning
///
/// Fail-open: with a poisoned lock, [`Self::contains`] returns `false` and
/// [`Self::insert`] does nothing. The ledger remains the authority on what
/// has been processed, so a missed skip costs at most one redundant lookup.
#[derive(Debug, Default)]
pub struct IgnoreCache {
    ids: RwLock<HashSet<SubmissionId>>,
}

impl IgnoreCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the submission should be skipped.
    #[must_use]
    pub fn contains(&self, id: &SubmissionId) -> bool {
        self.ids.read().is_ok_and(|ids| ids.contains(id))
    }

    /// Adds a submission. Returns true if it was not already present.
    pub fn insert(&self, id: SubmissionId) -> bool {
        match self.ids.write() {
            Ok(mut ids) => ids.insert(id),
            Err(_) => {
                tracing::warn!("Ignore cache lock poisoned, not recording submission");
                false
            },
        }
    }

    /// Number of ignored submissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.read().map_or(0, |ids| ids.len())
    }

    /// Returns true if nothing is ignored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
