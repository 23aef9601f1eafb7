//! Community platform contract.
//!
//! The core never talks to the network directly. Everything it needs from the
//! platform (listings, media, moderation actions, inbox) goes through
//! [`PlatformClient`], so the pipeline can be driven by a real API client or by
//! the scriptable `InMemoryPlatform` in tests (feature `test-support`).
//!
//! # Error classes
//!
//! | Variant | Meaning | Fatal to the run |
//! |---------|---------|------------------|
//! | `NotFound` | The item no longer exists | No |
//! | `Forbidden` | The bot lacks permission | No |
//! | `RateLimited` | Too many requests | No |
//! | `ServerError` | Platform-wide outage | **Yes** |
//! | `Other` | Any other per-item failure | No |
//!
//! Media downloads are the exception: [`PlatformClient::fetch_bytes`] usually
//! hits a third-party host, so every error it returns only fails that one
//! submission.

pub mod http;
#[cfg(any(test, feature = "test-support"))]
mod memory;

pub use http::{DEFAULT_USER_AGENT, HttpFetchConfig, HttpMediaFetcher, is_remote};
#[cfg(any(test, feature = "test-support"))]
pub use memory::InMemoryPlatform;

use crate::models::{LiveState, Submission, SubmissionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for platform calls.
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// A lazily produced listing of submissions.
///
/// Each item is fallible; an `Err` item ends the listing for the caller.
pub type Listing<'a> = Box<dyn Iterator<Item = PlatformResult<Submission>> + Send + 'a>;

/// Error classes reported by the platform client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The requested item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The bot lacks permission for the request.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The platform asked the bot to slow down.
    #[error("rate limited")]
    RateLimited {
        /// Seconds until the limit resets, when known.
        retry_after_secs: Option<u64>,
    },

    /// The platform is failing as a whole.
    #[error("server error: {0}")]
    ServerError(String),

    /// Any other failure scoped to a single item.
    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Returns true for errors that must terminate the scan loop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ServerError(_))
    }
}

/// Historical top-listing windows, in backfill order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    /// All time.
    All,
    /// Past year.
    Year,
    /// Past month.
    Month,
}

impl TimeWindow {
    /// Windows a backfill walks through, in order.
    pub const BACKFILL_ORDER: [Self; 3] = [Self::All, Self::Year, Self::Month];

    /// Returns the window as the platform's query value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Year => "year",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a comment posted by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    /// Creates a comment ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A comment the bot posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment identifier.
    pub id: CommentId,
    /// Submission the comment replies to.
    pub parent: SubmissionId,
    /// Rendered body.
    pub body: String,
}

/// Identifier of an inbox message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a message ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unread inbox message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Message identifier.
    pub id: MessageId,
    /// Sender, `None` for system messages.
    pub author: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Community the message was sent from, for invites and mentions.
    pub community: Option<String>,
    /// Submission a username mention was made under.
    pub submission: Option<SubmissionId>,
}

impl InboxMessage {
    /// Creates a direct message with no community context.
    #[must_use]
    pub fn direct(
        id: impl Into<String>,
        author: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(id),
            author: Some(author.into()),
            subject: subject.into(),
            body: body.into(),
            community: None,
            submission: None,
        }
    }

    /// Attaches the community the message was sent from.
    #[must_use]
    pub fn in_community(mut self, community: impl Into<String>) -> Self {
        self.community = Some(community.into());
        self
    }

    /// Attaches the submission a mention was made under.
    #[must_use]
    pub fn under_submission(mut self, submission: impl Into<SubmissionId>) -> Self {
        self.submission = Some(submission.into());
        self
    }
}

/// Everything the core consumes from the community platform.
///
/// Calls are blocking from the caller's point of view. Implementations map
/// transport failures onto [`PlatformError`] classes; only
/// [`PlatformError::ServerError`] ends a run.
pub trait PlatformClient: Send + Sync {
    /// Lists a community's top submissions for a historical window.
    fn list_top(&self, community: &str, window: TimeWindow) -> PlatformResult<Listing<'_>>;

    /// Lists a community's newest submissions.
    fn list_new(&self, community: &str) -> PlatformResult<Listing<'_>>;

    /// Downloads media bytes.
    fn fetch_bytes(&self, url: &str) -> PlatformResult<Vec<u8>>;

    /// Files a moderation report on a submission.
    fn report(&self, submission: &SubmissionId, reason: &str) -> PlatformResult<()>;

    /// Replies to a submission.
    fn reply(&self, submission: &SubmissionId, text: &str) -> PlatformResult<Comment>;

    /// Removes a comment the bot posted.
    fn remove_comment(&self, comment: &CommentId) -> PlatformResult<()>;

    /// Distinguishes a comment as a moderator, optionally pinning it.
    fn distinguish_comment(&self, comment: &CommentId, sticky: bool) -> PlatformResult<()>;

    /// Removes a submission from its community.
    fn remove_submission(&self, submission: &SubmissionId, reason: &str) -> PlatformResult<()>;

    /// Fetches the current state of a submission.
    ///
    /// `Ok(None)` means the platform no longer knows the submission.
    fn get_current_state(&self, submission: &SubmissionId) -> PlatformResult<Option<LiveState>>;

    /// Returns the unread inbox messages, oldest first.
    fn unread_messages(&self) -> PlatformResult<Vec<InboxMessage>>;

    /// Marks an inbox message as read.
    fn mark_read(&self, message: &MessageId) -> PlatformResult<()>;

    /// Replies to an inbox message.
    fn reply_to_message(&self, message: &MessageId, text: &str) -> PlatformResult<()>;

    /// Accepts a pending moderator invite.
    fn accept_invite(&self, community: &str) -> PlatformResult<()>;

    /// Returns true if `user` moderates `community`.
    fn is_moderator(&self, user: &str, community: &str) -> PlatformResult<bool>;

    /// Reads the community's configuration page, `None` when it does not exist.
    fn fetch_config_page(&self, community: &str) -> PlatformResult<Option<String>>;

    /// Creates or overwrites the community's configuration page.
    fn write_config_page(&self, community: &str, text: &str) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_server_errors_are_fatal() {
        assert!(PlatformError::ServerError("503".into()).is_fatal());
        assert!(!PlatformError::NotFound("x".into()).is_fatal());
        assert!(!PlatformError::Forbidden("x".into()).is_fatal());
        assert!(!PlatformError::RateLimited { retry_after_secs: Some(3) }.is_fatal());
        assert!(!PlatformError::Other("x".into()).is_fatal());
    }

    #[test]
    fn test_backfill_order() {
        let names: Vec<_> = TimeWindow::BACKFILL_ORDER.iter().map(TimeWindow::as_str).collect();
        assert_eq!(names, ["all", "year", "month"]);
    }

    #[test]
    fn test_message_builders() {
        let msg = InboxMessage::direct("m1", "alice", "re: r/pics", "update")
            .in_community("pics")
            .under_submission("abc");
        assert_eq!(msg.author.as_deref(), Some("alice"));
        assert_eq!(msg.community.as_deref(), Some("pics"));
        assert_eq!(msg.submission, Some(SubmissionId::new("abc")));
    }
}
