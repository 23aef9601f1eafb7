//! Report and auto-remove decisions for a detected repost.
//!
//! # Actions
//!
//! | Step | Action | On recoverable failure |
//! |------|--------|------------------------|
//! | 1 | Drop matches older than `max_post_age` days | - |
//! | 2 | Resolve live state of each original | row left out |
//! | 3 | Report the submission | logged |
//! | 4 | Reply with the evidence table | logged |
//! | 5 | Remove that reply if `remove_sentry_comments` | logged |
//! | 6 | Auto-remove and explain if every match clears `autoremove_threshold` | logged |
//!
//! A fatal platform error stops the remaining actions and is returned, so the
//! caller can finish its bookkeeping before the run ends.

use super::evidence::{self, EvidenceRow};
use crate::config::{BotConfig, CommunityConfig, TemplatesConfig};
use crate::models::{Match, Submission};
use crate::platform::{CommentId, PlatformClient, PlatformError};
use crate::{Error, Result};
use tracing::instrument;

const SECONDS_PER_DAY: i64 = 86_400;

/// Reason given when a submission is removed automatically.
pub const AUTOREMOVE_REASON: &str = "Repost";

/// What the report policy did for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Matches left after the age filter.
    pub considered: usize,
    /// Originals that are removed or deleted.
    pub gone: usize,
    /// A report was filed.
    pub reported: bool,
    /// Evidence reply, if one was posted.
    pub comment: Option<CommentId>,
    /// Rows included in the evidence reply.
    pub rows: usize,
    /// The submission was removed automatically.
    pub autoremoved: bool,
}

impl ReportOutcome {
    /// Returns true if anything was done on the platform.
    #[must_use]
    pub const fn acted(&self) -> bool {
        self.reported || self.comment.is_some() || self.autoremoved
    }
}

/// Returns the matches no older than `max_post_age_days` relative to
/// `reference`. Zero disables the filter.
#[must_use]
pub fn within_age(matches: &[Match], reference: i64, max_post_age_days: u32) -> Vec<Match> {
    if max_post_age_days == 0 {
        return matches.to_vec();
    }
    let max_age = i64::from(max_post_age_days) * SECONDS_PER_DAY;
    matches
        .iter()
        .filter(|m| reference.saturating_sub(m.record.created_at) <= max_age)
        .cloned()
        .collect()
}

/// Returns true when auto-removal applies to `matches`.
///
/// Requires `autoremove` and a non-empty match set whose lowest similarity is
/// at least `autoremove_threshold`.
#[must_use]
pub fn should_autoremove(matches: &[Match], config: &CommunityConfig) -> bool {
    config.autoremove
        && matches
            .iter()
            .map(|m| m.similarity)
            .min()
            .is_some_and(|lowest| lowest >= config.autoremove_threshold)
}

/// Report text citing the match counts.
#[must_use]
pub fn report_reason(matches: usize, gone: usize) -> String {
    format!("Possible repost ( {matches} matches | {gone} removed/deleted )")
}

/// Decides and performs the moderation actions for ranked matches.
#[derive(Debug, Clone)]
pub struct ReportPolicy {
    templates: TemplatesConfig,
    comment_size_budget: usize,
}

impl ReportPolicy {
    /// Creates a policy rendering with `templates` within `comment_size_budget`
    /// bytes per reply.
    #[must_use]
    pub const fn new(templates: TemplatesConfig, comment_size_budget: usize) -> Self {
        Self {
            templates,
            comment_size_budget,
        }
    }

    /// Creates a policy from the bot configuration.
    #[must_use]
    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.templates.clone(), config.scan.comment_size_budget)
    }

    /// Applies the policy to `submission` and its ranked `matches`.
    ///
    /// Recoverable platform failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal platform error; the actions after it are not
    /// attempted.
    #[instrument(
        skip(self, client, submission, matches, config),
        fields(
            operation = "apply_report_policy",
            community = %submission.community,
            submission_id = %submission.id,
            matches = matches.len()
        )
    )]
    pub fn apply<P: PlatformClient + ?Sized>(
        &self,
        client: &P,
        submission: &Submission,
        matches: &[Match],
        config: &CommunityConfig,
    ) -> Result<ReportOutcome> {
        let surviving = within_age(matches, submission.created_at, config.max_post_age);
        if surviving.is_empty() {
            tracing::debug!("No matches within the age limit");
            return Ok(ReportOutcome::default());
        }

        let rows = evidence::resolve_rows(client, &surviving)?;
        let mut outcome = ReportOutcome {
            considered: surviving.len(),
            // Unresolved originals count as gone.
            gone: surviving.len() - rows.iter().filter(|r| !r.status.is_gone()).count(),
            ..ReportOutcome::default()
        };

        let reason = report_reason(outcome.considered, outcome.gone);
        outcome.reported = advisory("report", client.report(&submission.id, &reason))?.is_some();
        if outcome.reported {
            metrics::counter!("sentry_reports_total").increment(1);
            tracing::info!(reason = %reason, "Reported possible repost");
        }

        self.post_evidence(client, submission, &rows, config, &mut outcome)?;

        if should_autoremove(&surviving, config) {
            self.autoremove(client, submission, config, &mut outcome)?;
        }

        Ok(outcome)
    }

    fn post_evidence<P: PlatformClient + ?Sized>(
        &self,
        client: &P,
        submission: &Submission,
        rows: &[EvidenceRow],
        config: &CommunityConfig,
        outcome: &mut ReportOutcome,
    ) -> Result<()> {
        let template = &self.templates.info_auto;
        let table = evidence::render_rows(
            rows,
            self.templates.overhead(template),
            self.comment_size_budget,
        );
        if table.included == 0 {
            tracing::debug!("No evidence rows to post");
            return Ok(());
        }
        if table.truncated > 0 {
            tracing::debug!(truncated = table.truncated, "Evidence table truncated");
        }

        let body = self.templates.render(template, &table.rows);
        let Some(comment) = advisory("reply", client.reply(&submission.id, &body))? else {
            return Ok(());
        };
        outcome.rows = table.included;

        if config.remove_sentry_comments {
            advisory("remove_comment", client.remove_comment(&comment.id))?;
        }
        outcome.comment = Some(comment.id);
        Ok(())
    }

    fn autoremove<P: PlatformClient + ?Sized>(
        &self,
        client: &P,
        submission: &Submission,
        config: &CommunityConfig,
        outcome: &mut ReportOutcome,
    ) -> Result<()> {
        let removed = advisory(
            "remove_submission",
            client.remove_submission(&submission.id, AUTOREMOVE_REASON),
        )?;
        if removed.is_none() {
            return Ok(());
        }
        outcome.autoremoved = true;
        metrics::counter!("sentry_autoremovals_total").increment(1);
        tracing::info!("Removed repost automatically");

        if config.autoremove_reply {
            let body = self.templates.render(&self.templates.autoremove_message, "");
            if let Some(comment) =
                advisory("autoremove_reply", client.reply(&submission.id, &body))?
            {
                advisory("distinguish_comment", client.distinguish_comment(&comment.id, true))?;
            }
        }
        Ok(())
    }
}

/// Discards a recoverable failure of an advisory action after logging it.
///
/// Returns `Ok(None)` for a recoverable failure and `Err` for a fatal one.
fn advisory<T>(action: &'static str, result: std::result::Result<T, PlatformError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(Error::Platform(e)),
        Err(e) => {
            tracing::warn!(action, error = %e, "Moderation action failed");
            metrics::counter!("sentry_action_failures_total", "action" => action).increment(1);
            Ok(None)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Fingerprint;
    use crate::models::{FingerprintRecord, LiveState, SubmissionId};
    use crate::platform::InMemoryPlatform;
    use test_case::test_case;

    const DAY: i64 = SECONDS_PER_DAY;
    const NOW: i64 = 1_700_000_000;

    fn m(id: &str, similarity: u8, age_days: i64) -> Match {
        Match {
            record: FingerprintRecord {
                hash: Fingerprint::new(0),
                submission_id: SubmissionId::new(id),
                community: "pics".to_string(),
                created_at: NOW - age_days * DAY,
            },
            similarity,
        }
    }

    fn submission() -> Submission {
        let mut s = Submission::builder("new", "pics");
        s.created_at = NOW;
        s
    }

    fn active(title: &str) -> LiveState {
        LiveState {
            score: 10,
            removed: false,
            author: Some("alice".to_string()),
            title: title.to_string(),
            url: "https://i.redd.it/a.jpg".to_string(),
            permalink: "https://redd.it/a".to_string(),
        }
    }

    fn policy() -> ReportPolicy {
        ReportPolicy::new(TemplatesConfig::default(), 10_000)
    }

    #[test_case(0, 3; "zero disables the filter")]
    #[test_case(30, 2; "thirty days")]
    #[test_case(5, 1; "five days")]
    #[test_case(1, 0; "one day")]
    fn test_within_age(max_days: u32, expected: usize) {
        let matches = [m("a", 99, 2), m("b", 99, 10), m("c", 99, 400)];
        assert_eq!(within_age(&matches, NOW, max_days).len(), expected);
    }

    #[test]
    fn test_within_age_boundary_is_inclusive() {
        let matches = [m("edge", 99, 7)];
        assert_eq!(within_age(&matches, NOW, 7).len(), 1);
        assert_eq!(within_age(&matches, NOW + 1, 7).len(), 0);
    }

    #[test_case(false, 90, &[99, 95], false; "disabled")]
    #[test_case(true, 95, &[99, 95], true; "minimum at threshold")]
    #[test_case(true, 96, &[99, 95], false; "minimum below threshold")]
    #[test_case(true, 90, &[], false; "no matches")]
    fn test_should_autoremove(enabled: bool, threshold: u8, sims: &[u8], expected: bool) {
        let config = CommunityConfig {
            autoremove: enabled,
            autoremove_threshold: threshold,
            ..CommunityConfig::default()
        };
        let matches: Vec<_> = sims.iter().map(|&s| m("x", s, 0)).collect();
        assert_eq!(should_autoremove(&matches, &config), expected);
    }

    #[test]
    fn test_report_reason() {
        assert_eq!(report_reason(3, 1), "Possible repost ( 3 matches | 1 removed/deleted )");
    }

    #[test]
    fn test_apply_reports_and_replies() {
        let platform = InMemoryPlatform::new();
        platform.set_live_state("a", active("first"));
        let mut removed = active("second");
        removed.removed = true;
        platform.set_live_state("b", removed);

        let outcome = policy()
            .apply(
                &platform,
                &submission(),
                &[m("a", 98, 1), m("b", 92, 2), m("old", 99, 500)],
                &CommunityConfig::default(),
            )
            .unwrap();

        assert_eq!(outcome.considered, 2);
        assert_eq!(outcome.gone, 1);
        assert!(outcome.reported);
        assert_eq!(outcome.rows, 2);
        assert!(!outcome.autoremoved);

        let reports = platform.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1, "Possible repost ( 2 matches | 1 removed/deleted )");

        let replies = platform.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].body.contains("[first](https://redd.it/a)"));
        assert!(replies[0].body.contains("| Removed | 92%"));
        assert!(replies[0].body.ends_with(&TemplatesConfig::default().bot_notice));
        assert!(platform.removed_comments().is_empty());
    }

    #[test]
    fn test_unresolved_originals_count_as_gone() {
        let platform = InMemoryPlatform::new();
        platform.set_live_state("a", active("first"));
        platform.fail_live_state("b", PlatformError::RateLimited { retry_after_secs: None });

        let outcome = policy()
            .apply(
                &platform,
                &submission(),
                &[m("a", 98, 1), m("b", 95, 1)],
                &CommunityConfig::default(),
            )
            .unwrap();

        assert_eq!(outcome.considered, 2);
        assert_eq!(outcome.gone, 1);
        assert_eq!(outcome.rows, 1);
        assert_eq!(platform.reports()[0].1, "Possible repost ( 2 matches | 1 removed/deleted )");
    }

    #[test]
    fn test_apply_without_surviving_matches_does_nothing() {
        let platform = InMemoryPlatform::new();
        let config = CommunityConfig {
            max_post_age: 10,
            autoremove: true,
            autoremove_threshold: 90,
            ..CommunityConfig::default()
        };
        let outcome = policy()
            .apply(&platform, &submission(), &[m("old", 100, 11)], &config)
            .unwrap();
        assert!(!outcome.acted());
        assert_eq!(platform.action_count(), 0);
    }

    #[test]
    fn test_apply_removes_sentry_comment_when_configured() {
        let platform = InMemoryPlatform::new();
        let config = CommunityConfig {
            remove_sentry_comments: true,
            ..CommunityConfig::default()
        };
        let outcome = policy()
            .apply(&platform, &submission(), &[m("a", 95, 1)], &config)
            .unwrap();
        let comment = outcome.comment.unwrap();
        assert_eq!(platform.removed_comments(), vec![comment]);
    }

    #[test]
    fn test_autoremove_posts_sticky_explanation() {
        let platform = InMemoryPlatform::new();
        let config = CommunityConfig {
            autoremove: true,
            autoremove_threshold: 95,
            ..CommunityConfig::default()
        };
        let outcome = policy()
            .apply(&platform, &submission(), &[m("a", 99, 1), m("b", 96, 1)], &config)
            .unwrap();

        assert!(outcome.autoremoved);
        assert_eq!(
            platform.removed_submissions(),
            vec![(SubmissionId::new("new"), AUTOREMOVE_REASON.to_string())]
        );
        let replies = platform.replies();
        assert_eq!(replies.len(), 2);
        assert!(replies[1].body.starts_with(&TemplatesConfig::default().autoremove_message));
        assert_eq!(platform.distinguished(), vec![(replies[1].id.clone(), true)]);
    }

    #[test]
    fn test_autoremove_without_reply() {
        let platform = InMemoryPlatform::new();
        let config = CommunityConfig {
            autoremove: true,
            autoremove_threshold: 95,
            autoremove_reply: false,
            ..CommunityConfig::default()
        };
        let outcome = policy()
            .apply(&platform, &submission(), &[m("a", 99, 1)], &config)
            .unwrap();
        assert!(outcome.autoremoved);
        assert_eq!(platform.replies().len(), 1);
        assert!(platform.distinguished().is_empty());
    }

    #[test]
    fn test_recoverable_failures_are_swallowed() {
        let platform = InMemoryPlatform::new();
        platform.fail_reports(PlatformError::Forbidden("report".to_string()));
        platform.fail_replies(PlatformError::RateLimited { retry_after_secs: Some(5) });
        platform.fail_removals(PlatformError::Other("nope".to_string()));
        let config = CommunityConfig {
            autoremove: true,
            autoremove_threshold: 90,
            ..CommunityConfig::default()
        };

        let outcome = policy()
            .apply(&platform, &submission(), &[m("a", 99, 1)], &config)
            .unwrap();
        assert_eq!(outcome.considered, 1);
        assert!(!outcome.acted());
    }

    #[test]
    fn test_fatal_failure_is_returned() {
        let platform = InMemoryPlatform::new();
        platform.fail_reports(PlatformError::ServerError("500".to_string()));
        let result = policy().apply(
            &platform,
            &submission(),
            &[m("a", 99, 1)],
            &CommunityConfig::default(),
        );
        assert!(result.unwrap_err().is_fatal());
        assert!(platform.replies().is_empty());
    }

    #[test]
    fn test_evidence_respects_comment_budget() {
        let platform = InMemoryPlatform::new();
        let templates = TemplatesConfig::default();
        let budget = templates.overhead(&templates.info_auto) + 250;
        let matches: Vec<_> = (0..25).map(|i| m(&format!("s{i:02}"), 95, 1)).collect();

        let outcome = ReportPolicy::new(templates, budget)
            .apply(&platform, &submission(), &matches, &CommunityConfig::default())
            .unwrap();

        assert!(outcome.rows > 0 && outcome.rows < 25);
        assert!(platform.replies()[0].body.len() <= budget);
        assert_eq!(outcome.considered, 25);
    }
}
