//! Data models for reposentry.
//!
//! This module contains the core data structures shared by storage and
//! services.

mod community;
mod corpus;
mod submission;

pub use community::{Community, IndexingState};
pub use corpus::{FingerprintRecord, LiveState, LiveStatus, Match};
pub use submission::{SUPPORTED_MEDIA_EXTENSIONS, Submission, SubmissionId};
