//! On-demand matching for username mentions.
//!
//! Read-only: a mention never reports, removes, or records anything.

use super::Matcher;
use super::evidence;
use crate::Result;
use crate::config::{BotConfig, CommunityConfig, TemplatesConfig};
use crate::models::{Match, SubmissionId};
use crate::platform::PlatformClient;
use crate::storage::MediaStore;
use tracing::instrument;

/// Most matches listed in a mention reply.
pub const MENTION_LIMIT: usize = 25;

/// Result of a mention query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionOutcome {
    /// The submission has no fingerprint yet.
    NoData,
    /// The corpus was searched and nothing cleared the threshold.
    NoMatches,
    /// Ranked matches, best first.
    Matches(Vec<Match>),
}

impl MentionOutcome {
    /// Returns the outcome label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::NoMatches => "no_matches",
            Self::Matches(_) => "matches",
        }
    }
}

/// Answers "have I seen this before?" for an indexed submission.
#[derive(Debug, Clone)]
pub struct MentionMatcher {
    matcher: Matcher,
    templates: TemplatesConfig,
    comment_size_budget: usize,
}

impl MentionMatcher {
    /// Creates a mention matcher.
    #[must_use]
    pub const fn new(templates: TemplatesConfig, comment_size_budget: usize) -> Self {
        Self {
            matcher: Matcher::new(MENTION_LIMIT),
            templates,
            comment_size_budget,
        }
    }

    /// Lists at most `limit` matches instead of [`MENTION_LIMIT`].
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.matcher = Matcher::new(limit);
        self
    }

    /// Creates a mention matcher from the bot configuration.
    #[must_use]
    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.templates.clone(), config.scan.comment_size_budget)
    }

    /// Searches the corpus of the submission's community at
    /// `mentioned_threshold`.
    ///
    /// # Errors
    ///
    /// Returns storage failures.
    #[instrument(skip(self, store, config), fields(operation = "mention_lookup", submission_id = %submission_id))]
    pub fn find<S: MediaStore + ?Sized>(
        &self,
        store: &S,
        submission_id: &SubmissionId,
        config: &CommunityConfig,
    ) -> Result<MentionOutcome> {
        let Some(record) = store.get_fingerprint(submission_id)? else {
            return Ok(MentionOutcome::NoData);
        };

        let matches = self.matcher.top_matches(
            store,
            &record.community,
            record.hash,
            submission_id,
            config.mentioned_threshold,
        )?;

        Ok(if matches.is_empty() {
            MentionOutcome::NoMatches
        } else {
            MentionOutcome::Matches(matches)
        })
    }

    /// Renders the reply for an outcome.
    ///
    /// # Errors
    ///
    /// Returns fatal platform errors raised while resolving matched originals.
    pub fn render<P: PlatformClient + ?Sized>(
        &self,
        client: &P,
        outcome: &MentionOutcome,
    ) -> Result<String> {
        let templates = &self.templates;
        Ok(match outcome {
            MentionOutcome::NoData => templates.render(&templates.mention_no_data, ""),
            MentionOutcome::NoMatches => templates.render(&templates.mention_no_matches, ""),
            MentionOutcome::Matches(matches) => {
                let rows = evidence::resolve_rows(client, matches)?;
                let table = evidence::render_rows(
                    &rows,
                    templates.overhead(&templates.info_mentioned),
                    self.comment_size_budget,
                );
                templates.render(&templates.info_mentioned, &table.rows)
            },
        })
    }

    /// Looks up a submission and renders the reply in one step.
    ///
    /// # Errors
    ///
    /// Returns storage failures and fatal platform errors.
    pub fn respond<P, S>(
        &self,
        client: &P,
        store: &S,
        submission_id: &SubmissionId,
        config: &CommunityConfig,
    ) -> Result<(MentionOutcome, String)>
    where
        P: PlatformClient + ?Sized,
        S: MediaStore + ?Sized,
    {
        let outcome = self.find(store, submission_id, config)?;
        tracing::info!(
            submission_id = %submission_id,
            outcome = outcome.as_str(),
            "Answered mention"
        );
        let reply = self.render(client, &outcome)?;
        Ok((outcome, reply))
    }
}
