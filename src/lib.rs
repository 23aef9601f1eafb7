//! # Reposentry
//!
//! Repost detection for moderated communities.
//!
//! Reposentry fingerprints every image submitted to a community with a 64-bit
//! difference hash and compares new fingerprints against that community's
//! growing corpus. Near-duplicates are reported to the moderators with an
//! evidence table, and optionally removed.
//!
//! ## Architecture
//!
//! - **Hash engine** ([`hashing`]): image bytes to [`Fingerprint`], or an
//!   explicit [`DecodeError`]
//! - **Storage** ([`storage`]): append-only fingerprint corpus, submission
//!   ledger, and community table (`SQLite`)
//! - **Services** ([`services`]): matcher, report policy, sentry pipeline,
//!   scan scheduler, mention matcher, and inbox dispatch
//! - **Platform** ([`platform`]): the contract the core consumes from the
//!   community platform client
//!
//! ## Example
//!
//! ```rust,ignore
//! use reposentry::{BotConfig, ScanScheduler, SqliteStore};
//!
//! let config = BotConfig::load_default();
//! let store = SqliteStore::new(&config.database_path)?;
//! let mut scheduler = ScanScheduler::new(client, store, config);
//! scheduler.run()?; // returns only on a fatal error
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod hashing;
pub mod models;
pub mod observability;
pub mod platform;
pub mod services;
pub mod storage;

pub use config::{BotConfig, CommunityConfig, ConfigRegistry, LimitsConfig};
pub use hashing::{DecodeError, DifferenceHasher, Fingerprint, HASH_VERSION, similarity};
pub use models::{
    Community, FingerprintRecord, IndexingState, LiveState, LiveStatus, Match, Submission,
    SubmissionId,
};
pub use platform::{PlatformClient, PlatformError, TimeWindow};
pub use services::{
    IgnoreCache, Matcher, MentionMatcher, MentionOutcome, ReportPolicy, ScanScheduler, Sentry,
};
pub use storage::{CommunityStore, MediaStore, SqliteStore, SubmissionLedger};

/// Error type for reposentry operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed fingerprints, unparsable config pages, bad CLI arguments |
/// | `OperationFailed` | `SQLite` queries fail, files cannot be read, logging cannot start |
/// | `Platform` | The platform client returned an error class |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - Filesystem I/O errors occur
    /// - Observability cannot be initialized
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The platform client failed.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl Error {
    /// Returns true when this error must terminate the scan loop.
    ///
    /// Storage failures and platform-wide server errors are fatal. Everything
    /// else is scoped to a single submission, message, or community.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidInput(_) => false,
            Self::OperationFailed { .. } => true,
            Self::Platform(e) => e.is_fatal(),
        }
    }
}

/// Result type alias for reposentry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
