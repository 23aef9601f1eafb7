//! Business logic services.
//!
//! Services combine the hash engine, the storage backends, and the platform
//! client into the repost-detection pipeline:
//!
//! - [`ScanScheduler`]: visits communities, picks backfill or monitoring
//! - [`Sentry`]: ledger check, fetch, hash, match, report, record
//! - [`Matcher`]: bounded top-N ranking over a streamed corpus
//! - [`ReportPolicy`]: age filter, evidence, report, auto-remove
//! - [`MentionMatcher`]: read-only lookups on user request
//! - [`InboxHandler`]: invites, removals, mentions, and moderator commands

mod evidence;
mod ignore_cache;
mod inbox;
mod matcher;
mod mention;
mod report;
mod scheduler;
mod sentry;

pub use evidence::{EvidenceRow, RenderedTable, format_timestamp, render_rows, resolve_rows};
pub use ignore_cache::IgnoreCache;
pub use inbox::{CommandKind, InboxCommand, InboxHandler, parse_config_page};
pub use matcher::{DEFAULT_TOP_MATCHES, Matcher};
pub use mention::{MENTION_LIMIT, MentionMatcher, MentionOutcome};
pub use report::{
    AUTOREMOVE_REASON, ReportOutcome, ReportPolicy, report_reason, should_autoremove, within_age,
};
pub use scheduler::{CycleReport, ScanMode, ScanReport, ScanScheduler};
pub use sentry::{Sentry, SentryOutcome};
