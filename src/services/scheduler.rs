//! The scan loop.
//!
//! # Indexing state machine
//!
//! ```text
//!                 every cycle              all windows done
//!  Unindexed ──────────────────▶ Backfilling ─────────────────▶ Indexed
//!      ▲                              │                           │
//!      └──── listing error ───────────┘                           │
//!                                                    newest listing, reporting on
//! ```
//!
//! Backfill walks the top listings for all time, the past year, and the past
//! month, recording fingerprints with reporting off. Only when every window
//! completes is the community flipped to `Indexed`; otherwise it stays
//! `Unindexed` and the next cycle starts over. The ledger makes the repeated
//! submissions free.

use super::{InboxHandler, Sentry, SentryOutcome, parse_config_page};
use crate::config::{BotConfig, CommunityConfig, ConfigRegistry};
use crate::models::{Community, IndexingState, Submission};
use crate::platform::{Listing, PlatformClient, PlatformResult, TimeWindow};
use crate::storage::{CommunityStore, MediaStore, SubmissionLedger};
use crate::{Error, Result};
use std::thread;
use std::time::{Duration, Instant};
use tracing::instrument;

/// How a community was scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Historical backfill, reporting off.
    Backfill,
    /// Newest submissions, reporting on.
    Monitor,
}

impl ScanMode {
    /// Returns the mode label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill => "backfill",
            Self::Monitor => "monitor",
        }
    }
}

/// Result of scanning one community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Community scanned.
    pub community: String,
    /// How it was scanned.
    pub mode: ScanMode,
    /// Submissions taken from listings.
    pub seen: usize,
    /// Fingerprints recorded.
    pub recorded: usize,
    /// Reports filed.
    pub reported: usize,
    /// Every listing was read to the end.
    pub completed: bool,
    /// Indexing state after the scan.
    pub state: IndexingState,
}

impl ScanReport {
    fn new(community: &str, mode: ScanMode, state: IndexingState) -> Self {
        Self {
            community: community.to_string(),
            mode,
            seen: 0,
            recorded: 0,
            reported: 0,
            completed: false,
            state,
        }
    }

    fn count(&mut self, outcome: &SentryOutcome) {
        self.seen += 1;
        if let SentryOutcome::Recorded { report, .. } = outcome {
            self.recorded += 1;
            if report.as_ref().is_some_and(|r| r.reported) {
                self.reported += 1;
            }
        }
    }
}

/// Result of one pass over every community.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Inbox messages handled.
    pub messages: usize,
    /// Per-community scan results, in visiting order.
    pub scans: Vec<ScanReport>,
}

/// Visits every known community once per cycle, handling the inbox in
/// between.
///
/// Owns the platform client, the store, the per-community config snapshots,
/// and the sentry with its ignore cache.
pub struct ScanScheduler<P, S> {
    client: P,
    store: S,
    config: BotConfig,
    registry: ConfigRegistry,
    sentry: Sentry,
    inbox: InboxHandler,
}

impl<P, S> ScanScheduler<P, S>
where
    P: PlatformClient,
    S: CommunityStore + SubmissionLedger + MediaStore,
{
    /// Creates a scheduler with an empty config registry.
    #[must_use]
    pub fn new(client: P, store: S, config: BotConfig) -> Self {
        Self {
            sentry: Sentry::from_config(&config),
            inbox: InboxHandler::from_config(&config),
            registry: ConfigRegistry::new(),
            client,
            store,
            config,
        }
    }

    /// Replaces the config registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ConfigRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The platform client.
    pub const fn client(&self) -> &P {
        &self.client
    }

    /// The store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The per-community config snapshots.
    pub const fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    /// The sentry, including its ignore cache.
    pub const fn sentry(&self) -> &Sentry {
        &self.sentry
    }

    /// Runs cycles until a fatal error.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the run. This function does not
    /// return otherwise.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!("Scan loop starting");
        loop {
            if let Err(e) = self.run_cycle() {
                tracing::error!(error = %e, "Scan loop stopped");
                return Err(e);
            }
        }
    }

    /// Runs one cycle: inbox, then each community followed by the inbox.
    ///
    /// With no communities, only the inbox is handled and the configured idle
    /// pause is slept.
    ///
    /// # Errors
    ///
    /// Returns storage failures and fatal platform errors.
    #[instrument(skip(self), fields(operation = "run_cycle"))]
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let start = Instant::now();
        let mut cycle = CycleReport {
            messages: self.handle_inbox()?,
            ..CycleReport::default()
        };

        let communities = self.store.list_communities()?;
        if communities.is_empty() {
            let pause = self.config.scan.idle_pause_secs;
            tracing::debug!(pause_secs = pause, "No communities, idling");
            thread::sleep(Duration::from_secs(pause));
        }

        for community in communities {
            // The inbox may have removed it since the list was read.
            let Some(current) = self.store.get_community(&community.name)? else {
                continue;
            };
            cycle.scans.push(self.scan_community(&current)?);
            cycle.messages += self.handle_inbox()?;
        }

        metrics::counter!("scheduler_cycles_total").increment(1);
        metrics::histogram!("scheduler_cycle_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        Ok(cycle)
    }

    /// Scans one community according to its indexing state.
    ///
    /// # Errors
    ///
    /// Returns storage failures and fatal platform errors. Recoverable
    /// listing errors end the scan early instead.
    #[instrument(skip(self, community), fields(community = %community.name, state = %community.state))]
    pub fn scan_community(&mut self, community: &Community) -> Result<ScanReport> {
        let config = self.community_config(&community.name)?;
        if community.is_indexed() {
            self.monitor(&community.name, &config)
        } else {
            self.backfill(community, &config)
        }
    }

    fn handle_inbox(&mut self) -> Result<usize> {
        self.inbox
            .process(&self.client, &self.store, &mut self.registry)
    }

    /// Returns the community's snapshot, loading its page on first use.
    fn community_config(&mut self, name: &str) -> Result<CommunityConfig> {
        if let Some(config) = self.registry.get(name) {
            return Ok(config.clone());
        }

        let config = match self.client.fetch_config_page(name) {
            Ok(Some(text)) => {
                parse_config_page(name, &text, &self.config.limits).unwrap_or_default()
            },
            Ok(None) => CommunityConfig::default(),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(community = name, error = %e, "Could not load config page");
                CommunityConfig::default()
            },
        };
        self.registry.insert(name, config.clone());
        Ok(config)
    }

    fn backfill(&self, community: &Community, config: &CommunityConfig) -> Result<ScanReport> {
        let name = community.name.as_str();
        let mut report = ScanReport::new(name, ScanMode::Backfill, community.state);
        if !community.state.can_transition_to(IndexingState::Backfilling) {
            return Ok(report);
        }
        tracing::info!(community = name, "Backfill starting");

        for window in TimeWindow::BACKFILL_ORDER {
            let listing = self.client.list_top(name, window);
            if !self.drain(listing, config, false, &mut report)? {
                tracing::warn!(
                    community = name,
                    window = %window,
                    "Backfill interrupted, will restart next cycle"
                );
                report.state = IndexingState::Unindexed;
                return Ok(report);
            }
            tracing::debug!(community = name, window = %window, seen = report.seen, "Window done");
        }

        self.store.mark_indexed(name)?;
        report.completed = true;
        report.state = IndexingState::Indexed;
        metrics::counter!("scheduler_backfills_completed_total").increment(1);
        tracing::info!(
            community = name,
            recorded = report.recorded,
            "Backfill complete, community indexed"
        );
        Ok(report)
    }

    fn monitor(&self, name: &str, config: &CommunityConfig) -> Result<ScanReport> {
        let mut report = ScanReport::new(name, ScanMode::Monitor, IndexingState::Indexed);
        let listing = self.client.list_new(name);
        report.completed = self.drain(listing, config, true, &mut report)?;
        Ok(report)
    }

    /// Feeds a listing through the sentry.
    ///
    /// Returns `false` if a recoverable listing error cut it short.
    fn drain(
        &self,
        listing: PlatformResult<Listing<'_>>,
        config: &CommunityConfig,
        reporting: bool,
        report: &mut ScanReport,
    ) -> Result<bool> {
        let listing = match listing {
            Ok(listing) => listing,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(mode = report.mode.as_str(), error = %e, "Listing failed");
                return Ok(false);
            },
        };

        for item in listing {
            let submission: Submission = match item {
                Ok(submission) => submission,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(mode = report.mode.as_str(), error = %e, "Listing failed");
                    return Ok(false);
                },
            };
            match self
                .sentry
                .handle_submission(&self.client, &self.store, &submission, config, reporting)
            {
                Ok(outcome) => report.count(&outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log_skipped(&submission, &e),
            }
        }
        Ok(true)
    }
}

fn log_skipped(submission: &Submission, error: &Error) {
    tracing::warn!(submission_id = %submission.id, error = %error, "Submission skipped");
}
