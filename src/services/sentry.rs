//! Per-submission pipeline.
//!
//! ```text
//! submission ─▶ ignored? ─▶ in ledger? ─▶ fetch ─▶ hash ─▶ claim ─▶ record ─▶ match ─▶ report
//!                  │            │           │        │        │
//!                  ▼            ▼           ▼        ▼        ▼
//!                 skip         skip     ignore + ledger(false)  skip if already claimed
//! ```
//!
//! The ledger row is claimed before the report policy runs, so of two
//! overlapping scans only the one that wrote the row takes moderation
//! actions. Media fetch failures never end the run.

use super::{IgnoreCache, Matcher, ReportOutcome, ReportPolicy};
use crate::Result;
use crate::config::{BotConfig, CommunityConfig};
use crate::hashing::{DifferenceHasher, Fingerprint};
use crate::models::{FingerprintRecord, Submission};
use crate::platform::PlatformClient;
use crate::storage::{MediaStore, SubmissionLedger};
use std::fmt;
use tracing::instrument;

/// How a submission left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentryOutcome {
    /// Text post; nothing to hash and no ledger entry.
    SelfPost,
    /// Failed earlier in this run.
    Ignored,
    /// Already in the ledger.
    AlreadySeen,
    /// Links to nothing the hasher can decode.
    NoMedia,
    /// Media could not be fetched.
    FetchFailed,
    /// Media could not be decoded.
    DecodeFailed,
    /// Fingerprint recorded. Carries the report outcome when reporting ran.
    Recorded {
        /// The fingerprint.
        fingerprint: Fingerprint,
        /// What the report policy did, `None` when reporting was off.
        report: Option<ReportOutcome>,
    },
}

impl SentryOutcome {
    /// Returns the outcome label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SelfPost => "self_post",
            Self::Ignored => "ignored",
            Self::AlreadySeen => "already_seen",
            Self::NoMedia => "no_media",
            Self::FetchFailed => "fetch_failed",
            Self::DecodeFailed => "decode_failed",
            Self::Recorded { .. } => "recorded",
        }
    }

    /// Returns true if a fingerprint was recorded.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

impl fmt::Display for SentryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hashes, matches, and reports submissions.
///
/// Owns the process-lifetime [`IgnoreCache`]; the platform client and store
/// are passed into each call.
#[derive(Debug)]
pub struct Sentry {
    hasher: DifferenceHasher,
    matcher: Matcher,
    policy: ReportPolicy,
    ignored: IgnoreCache,
}

impl Sentry {
    /// Creates a sentry with an empty ignore cache.
    #[must_use]
    pub fn new(hasher: DifferenceHasher, matcher: Matcher, policy: ReportPolicy) -> Self {
        Self {
            hasher,
            matcher,
            policy,
            ignored: IgnoreCache::new(),
        }
    }

    /// Creates a sentry from the bot configuration.
    #[must_use]
    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            DifferenceHasher::new().with_max_bytes(config.scan.max_media_bytes),
            Matcher::new(config.scan.top_matches),
            ReportPolicy::from_config(config),
        )
    }

    /// Submissions skipped for the rest of this run.
    #[must_use]
    pub const fn ignored(&self) -> &IgnoreCache {
        &self.ignored
    }

    /// Runs one submission through the pipeline.
    ///
    /// With `reporting` off (backfill), the fingerprint is recorded but the
    /// corpus is not queried and no moderation action is taken.
    ///
    /// # Errors
    ///
    /// Returns storage failures and fatal platform errors raised while
    /// reporting. Those are returned after the fingerprint and ledger entry
    /// have been written.
    #[instrument(
        skip(self, client, store, submission, config),
        fields(
            operation = "handle_submission",
            community = %submission.community,
            submission_id = %submission.id,
            outcome = tracing::field::Empty
        )
    )]
    pub fn handle_submission<P, S>(
        &self,
        client: &P,
        store: &S,
        submission: &Submission,
        config: &CommunityConfig,
        reporting: bool,
    ) -> Result<SentryOutcome>
    where
        P: PlatformClient + ?Sized,
        S: SubmissionLedger + MediaStore + ?Sized,
    {
        let outcome = self.process(client, store, submission, config, reporting);
        if let Ok(outcome) = &outcome {
            tracing::Span::current().record("outcome", outcome.as_str());
            metrics::counter!("sentry_submissions_total", "outcome" => outcome.as_str())
                .increment(1);
        }
        outcome
    }

    fn process<P, S>(
        &self,
        client: &P,
        store: &S,
        submission: &Submission,
        config: &CommunityConfig,
        reporting: bool,
    ) -> Result<SentryOutcome>
    where
        P: PlatformClient + ?Sized,
        S: SubmissionLedger + MediaStore + ?Sized,
    {
        if submission.is_self {
            return Ok(SentryOutcome::SelfPost);
        }
        if self.ignored.contains(&submission.id) {
            return Ok(SentryOutcome::Ignored);
        }
        if store.contains_entry(&submission.id)? {
            return Ok(SentryOutcome::AlreadySeen);
        }

        let Some(url) = submission.media_url() else {
            store.insert_entry(&submission.id, false)?;
            return Ok(SentryOutcome::NoMedia);
        };

        // Media hosts are not the platform API: any fetch error, server
        // errors included, only costs this submission.
        let bytes = match client.fetch_bytes(&url) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Media fetch failed");
                self.give_up(store, submission)?;
                return Ok(SentryOutcome::FetchFailed);
            },
        };

        let fingerprint = match self.hasher.hash_bytes(&bytes) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Media decode failed");
                self.give_up(store, submission)?;
                return Ok(SentryOutcome::DecodeFailed);
            },
        };

        // Claim the ledger row before any moderation action so that an
        // overlapping scan of the same submission backs off here.
        if !store.insert_entry(&submission.id, true)?.is_inserted() {
            tracing::debug!("Submission claimed by an overlapping scan");
            return Ok(SentryOutcome::AlreadySeen);
        }
        let inserted = store.record(&FingerprintRecord {
            hash: fingerprint,
            submission_id: submission.id.clone(),
            community: submission.community.clone(),
            created_at: submission.created_at,
        })?;
        if !inserted {
            tracing::debug!("Fingerprint already recorded");
        }

        let report = if reporting {
            let matches = self.matcher.top_matches(
                store,
                &submission.community,
                fingerprint,
                &submission.id,
                config.sentry_threshold,
            )?;
            if matches.is_empty() {
                Some(ReportOutcome::default())
            } else {
                Some(self.policy.apply(client, submission, &matches, config)?)
            }
        } else {
            None
        };

        Ok(SentryOutcome::Recorded {
            fingerprint,
            report,
        })
    }

    fn give_up<S: SubmissionLedger + ?Sized>(&self, store: &S, submission: &Submission) -> Result<()> {
        self.ignored.insert(submission.id.clone());
        store.insert_entry(&submission.id, false)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplatesConfig;
    use crate::models::SubmissionId;
    use crate::platform::{InMemoryPlatform, PlatformError};
    use crate::storage::{LedgerEntry, LedgerInsert, SqliteStore};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(seed: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(32, 32, |x, y| {
            let v = u8::try_from((x * 7 + y * 3) % 256).unwrap_or(0);
            Rgb([v.wrapping_add(seed), v, 255 - v])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn image_post(id: &str, created_at: i64) -> Submission {
        let mut s = Submission::builder(id, "pics");
        s.url = format!("https://i.redd.it/{id}.png");
        s.created_at = created_at;
        s
    }

    fn sentry() -> Sentry {
        Sentry::new(
            DifferenceHasher::new(),
            Matcher::default(),
            ReportPolicy::new(TemplatesConfig::default(), 10_000),
        )
    }

    #[test]
    fn test_self_post_skipped_without_ledger_entry() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let mut post = image_post("text", 1);
        post.is_self = true;

        let outcome = sentry()
            .handle_submission(&platform, &store, &post, &CommunityConfig::default(), true)
            .unwrap();
        assert_eq!(outcome, SentryOutcome::SelfPost);
        assert_eq!(store.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_unsupported_link_gets_unprocessed_entry() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let mut post = image_post("link", 1);
        post.url = "https://example.com/article".to_string();

        let outcome = sentry()
            .handle_submission(&platform, &store, &post, &CommunityConfig::default(), true)
            .unwrap();
        assert_eq!(outcome, SentryOutcome::NoMedia);
        let entry = store.get_entry(&post.id).unwrap().unwrap();
        assert!(!entry.processed);
        assert_eq!(platform.fetch_count(&post.url), 0);
    }

    #[test]
    fn test_records_and_marks_processed() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let post = image_post("a", 100);
        platform.add_media(&post.url, png(0));

        let sentry = sentry();
        let outcome = sentry
            .handle_submission(&platform, &store, &post, &CommunityConfig::default(), false)
            .unwrap();
        assert!(outcome.is_recorded());

        let record = store.get_fingerprint(&post.id).unwrap().unwrap();
        assert_eq!(record.created_at, 100);
        assert_eq!(record.community, "pics");
        assert!(store.get_entry(&post.id).unwrap().unwrap().processed);

        let again = sentry
            .handle_submission(&platform, &store, &post, &CommunityConfig::default(), false)
            .unwrap();
        assert_eq!(again, SentryOutcome::AlreadySeen);
        assert_eq!(platform.fetch_count(&post.url), 1);
    }

    #[test]
    fn test_fetch_failure_is_terminal() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let post = image_post("missing", 1);
        platform.fail_media(&post.url, PlatformError::NotFound(post.url.clone()));

        let sentry = sentry();
        let outcome = sentry
            .handle_submission(&platform, &store, &post, &CommunityConfig::default(), true)
            .unwrap();
        assert_eq!(outcome, SentryOutcome::FetchFailed);
        assert!(sentry.ignored().contains(&post.id));
        assert!(store.get_fingerprint(&post.id).unwrap().is_none());
        assert!(!store.get_entry(&post.id).unwrap().unwrap().processed);

        let again = sentry
            .handle_submission(&platform, &store, &post, &CommunityConfig::default(), true)
            .unwrap();
        assert_eq!(again, SentryOutcome::Ignored);
        assert_eq!(platform.fetch_count(&post.url), 1);
        assert_eq!(store.entry_count().unwrap(), 1);
    }

    #[test]
    fn test_decode_failure_is_terminal() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let post = image_post("garbage", 1);
        platform.add_media(&post.url, b"<html>not an image</html>".to_vec());

        let sentry = sentry();
        let outcome = sentry
            .handle_submission(&platform, &store, &post, &CommunityConfig::default(), true)
            .unwrap();
        assert_eq!(outcome, SentryOutcome::DecodeFailed);
        assert!(sentry.ignored().contains(&post.id));
        assert!(store.get_fingerprint(&post.id).unwrap().is_none());
    }

    #[test]
    fn test_media_server_error_only_skips_the_submission() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let broken = image_post("outage", 1);
        let good = image_post("fine", 2);
        platform.fail_media(&broken.url, PlatformError::ServerError("502".to_string()));
        platform.add_media(&good.url, png(0));

        let sentry = sentry();
        let config = CommunityConfig::default();
        let outcome = sentry
            .handle_submission(&platform, &store, &broken, &config, true)
            .unwrap();
        assert_eq!(outcome, SentryOutcome::FetchFailed);
        assert!(sentry.ignored().contains(&broken.id));
        assert!(!store.get_entry(&broken.id).unwrap().unwrap().processed);

        let next = sentry
            .handle_submission(&platform, &store, &good, &config, true)
            .unwrap();
        assert!(next.is_recorded());
        assert!(store.get_entry(&good.id).unwrap().unwrap().processed);
    }

    #[test]
    fn test_claimed_submission_is_not_reported_twice() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let config = CommunityConfig::default();
        let original = image_post("original", 100);
        let repost = image_post("repost", 200);
        platform.add_media(&original.url, png(0));
        platform.add_media(&repost.url, png(0));
        sentry()
            .handle_submission(&platform, &store, &original, &config, false)
            .unwrap();

        // Another scan claims the row after this one passed its ledger check.
        let lagging = LaggingLedger {
            inner: &store,
            hidden: repost.id.clone(),
        };
        let first = sentry()
            .handle_submission(&platform, &lagging, &repost, &config, true)
            .unwrap();
        let second = sentry()
            .handle_submission(&platform, &lagging, &repost, &config, true)
            .unwrap();

        assert!(first.is_recorded());
        assert_eq!(second, SentryOutcome::AlreadySeen);
        assert_eq!(platform.reports().len(), 1);
        assert_eq!(platform.replies().len(), 1);
        assert_eq!(store.entry_count().unwrap(), 2);
    }

    /// A store whose ledger reads never see one submission's row.
    struct LaggingLedger<'a> {
        inner: &'a SqliteStore,
        hidden: SubmissionId,
    }

    impl SubmissionLedger for LaggingLedger<'_> {
        fn insert_entry(&self, id: &SubmissionId, processed: bool) -> Result<LedgerInsert> {
            self.inner.insert_entry(id, processed)
        }

        fn get_entry(&self, id: &SubmissionId) -> Result<Option<LedgerEntry>> {
            if *id == self.hidden {
                return Ok(None);
            }
            self.inner.get_entry(id)
        }

        fn entry_count(&self) -> Result<usize> {
            self.inner.entry_count()
        }
    }

    impl MediaStore for LaggingLedger<'_> {
        fn record(&self, record: &FingerprintRecord) -> Result<bool> {
            self.inner.record(record)
        }

        fn get_fingerprint(&self, id: &SubmissionId) -> Result<Option<FingerprintRecord>> {
            self.inner.get_fingerprint(id)
        }

        fn corpus_size(&self, community: &str) -> Result<usize> {
            self.inner.corpus_size(community)
        }

        fn fetch_page(
            &self,
            community: &str,
            exclude: &SubmissionId,
            after: i64,
            limit: usize,
        ) -> Result<Vec<(i64, FingerprintRecord)>> {
            self.inner.fetch_page(community, exclude, after, limit)
        }
    }

    #[test]
    fn test_repost_reported_only_when_reporting() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let sentry = sentry();
        let config = CommunityConfig::default();

        let original = image_post("original", 100);
        let backfilled = image_post("backfilled", 200);
        let repost = image_post("repost", 300);
        for post in [&original, &backfilled, &repost] {
            platform.add_media(&post.url, png(0));
        }

        sentry
            .handle_submission(&platform, &store, &original, &config, false)
            .unwrap();
        sentry
            .handle_submission(&platform, &store, &backfilled, &config, false)
            .unwrap();
        assert_eq!(platform.action_count(), 0);

        let outcome = sentry
            .handle_submission(&platform, &store, &repost, &config, true)
            .unwrap();
        let SentryOutcome::Recorded {
            report: Some(report),
            ..
        } = outcome
        else {
            panic!("expected a report outcome, got {outcome:?}");
        };
        assert!(report.reported);
        assert_eq!(report.considered, 2);
        assert_eq!(platform.reports()[0].0, SubmissionId::new("repost"));
    }

    #[test]
    fn test_fatal_report_error_still_marks_processed() {
        let platform = InMemoryPlatform::new();
        let store = SqliteStore::in_memory().unwrap();
        let sentry = sentry();
        let config = CommunityConfig::default();

        let original = image_post("original", 100);
        let repost = image_post("repost", 200);
        platform.add_media(&original.url, png(0));
        platform.add_media(&repost.url, png(0));
        sentry
            .handle_submission(&platform, &store, &original, &config, false)
            .unwrap();

        platform.fail_reports(PlatformError::ServerError("500".to_string()));
        let result = sentry.handle_submission(&platform, &store, &repost, &config, true);
        assert!(result.unwrap_err().is_fatal());
        assert!(store.get_fingerprint(&repost.id).unwrap().is_some());
        assert!(store.get_entry(&repost.id).unwrap().unwrap().processed);
    }
}
