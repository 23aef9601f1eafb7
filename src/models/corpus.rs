//! Corpus records, matches, and live submission state.

use super::SubmissionId;
use crate::hashing::Fingerprint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One fingerprint in a community's corpus.
///
/// Append-only: records are never updated or deleted, so reposts of removed
/// or deleted originals are still detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// The perceptual hash.
    pub hash: Fingerprint,
    /// Submission the hash was computed from.
    pub submission_id: SubmissionId,
    /// Community the submission belongs to.
    pub community: String,
    /// Creation time of the submission (Unix epoch seconds).
    pub created_at: i64,
}

/// A corpus record paired with its similarity to a query fingerprint.
///
/// Computed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// The matching record.
    pub record: FingerprintRecord,
    /// Similarity score in `[0, 100]`.
    pub similarity: u8,
}

/// Current state of a previously seen submission, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    /// Current score.
    pub score: i64,
    /// Removed by moderators.
    pub removed: bool,
    /// Author name, `None` when deleted.
    pub author: Option<String>,
    /// Submission title.
    pub title: String,
    /// Link target.
    pub url: String,
    /// Link to the submission itself.
    pub permalink: String,
}

impl LiveState {
    /// Resolves the evidence status. Removal takes precedence over deletion.
    #[must_use]
    pub const fn status(&self) -> LiveStatus {
        if self.removed {
            LiveStatus::Removed
        } else if self.author.is_none() {
            LiveStatus::Deleted
        } else {
            LiveStatus::Active
        }
    }
}

/// Status shown in evidence tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiveStatus {
    /// Still visible.
    Active,
    /// Removed by moderators.
    Removed,
    /// Deleted by its author.
    Deleted,
}

impl LiveStatus {
    /// Returns the status label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Removed => "Removed",
            Self::Deleted => "Deleted",
        }
    }

    /// Returns true for removed or deleted originals.
    #[must_use]
    pub const fn is_gone(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
