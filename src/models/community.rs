//! Community and indexing state types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-community indexing state.
///
/// Only `Indexed` is persisted (as `indexed = true`). `Backfilling` exists for
/// the duration of a historical scan; if the scan does not complete, the
/// persisted state stays `Unindexed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingState {
    /// No historical backfill has completed.
    #[default]
    Unindexed,
    /// Historical backfill in progress.
    Backfilling,
    /// Backfill complete; steady-state monitoring.
    Indexed,
}

impl IndexingState {
    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unindexed => "unindexed",
            Self::Backfilling => "backfilling",
            Self::Indexed => "indexed",
        }
    }

    /// Maps the persisted `indexed` flag to a state.
    #[must_use]
    pub const fn from_indexed(indexed: bool) -> Self {
        if indexed { Self::Indexed } else { Self::Unindexed }
    }

    /// Returns true if `next` is a legal forward transition from this state.
    ///
    /// `Unindexed -> Backfilling -> Indexed`. A backfill that fails falls
    /// back to `Unindexed`, which is the only permitted backwards step.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unindexed, Self::Backfilling)
                | (Self::Backfilling, Self::Indexed | Self::Unindexed)
        )
    }
}

impl fmt::Display for IndexingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A moderated community the bot monitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    /// Unique community name.
    pub name: String,
    /// Current indexing state.
    pub state: IndexingState,
}

impl Community {
    /// Creates a community in the given state.
    #[must_use]
    pub fn new(name: impl Into<String>, state: IndexingState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    /// Returns true once the historical backfill has completed.
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        matches!(self.state, IndexingState::Indexed)
    }
}
