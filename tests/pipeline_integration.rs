//! End-to-end tests of the scan pipeline.
//!
//! Each test drives a [`ScanScheduler`] over an in-memory `SQLite` store and a
//! scripted [`InMemoryPlatform`].

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{active_state, grid_png, image_post, test_config};
use reposentry::platform::{InMemoryPlatform, InboxMessage, PlatformError};
use reposentry::services::{ScanMode, SentryOutcome};
use reposentry::{
    CommunityConfig, CommunityStore, ConfigRegistry, IndexingState, MediaStore, ScanScheduler, Sentry,
    SqliteStore, SubmissionId, SubmissionLedger, TimeWindow,
};
use std::thread;

const DAY: i64 = 86_400;
const T0: i64 = 1_650_000_000;

type Scheduler = ScanScheduler<InMemoryPlatform, SqliteStore>;

fn scheduler_with(platform: InMemoryPlatform, registry: ConfigRegistry) -> Scheduler {
    ScanScheduler::new(platform, SqliteStore::in_memory().unwrap(), test_config())
        .with_registry(registry)
}

fn scheduler(platform: InMemoryPlatform) -> Scheduler {
    scheduler_with(platform, ConfigRegistry::new())
}

/// Scripts the three backfill windows with `counts` distinct images each.
fn script_backfill(platform: &InMemoryPlatform, community: &str, counts: [usize; 3]) -> usize {
    let mut seed = 0u64;
    for (window, count) in TimeWindow::BACKFILL_ORDER.into_iter().zip(counts) {
        let mut posts = Vec::new();
        for _ in 0..count {
            seed += 1;
            let created_at = T0 + i64::try_from(seed).unwrap();
            let post = image_post(&format!("{community}{seed}"), community, created_at);
            platform.add_media(&post.url, grid_png(seed));
            posts.push(post);
        }
        platform.set_top(community, window, posts);
    }
    counts.iter().sum()
}

fn indexed(scheduler: &Scheduler, community: &str) -> bool {
    scheduler
        .store()
        .get_community(community)
        .unwrap()
        .is_some_and(|c| c.is_indexed())
}

#[test]
fn test_backfill_records_every_window_without_reporting() {
    let platform = InMemoryPlatform::new();
    let total = script_backfill(&platform, "foo", [3, 2, 1]);
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();

    let cycle = scheduler.run_cycle().unwrap();

    assert_eq!(total, 6);
    assert_eq!(scheduler.store().corpus_size("foo").unwrap(), 6);
    assert_eq!(scheduler.client().reports().len(), 0);
    assert_eq!(scheduler.client().action_count(), 0);
    assert_eq!(cycle.scans[0].mode, ScanMode::Backfill);
    assert_eq!(cycle.scans[0].recorded, 6);
    assert_eq!(cycle.scans[0].state, IndexingState::Indexed);
    assert!(indexed(&scheduler, "foo"));
}

#[test]
fn test_backfill_never_reports_even_with_duplicates() {
    let platform = InMemoryPlatform::new();
    let posts: Vec<_> = (0..5)
        .map(|i| image_post(&format!("same{i}"), "foo", T0 + i))
        .collect();
    for post in &posts {
        platform.add_media(&post.url, grid_png(42));
    }
    platform.set_top("foo", TimeWindow::All, posts);
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();

    scheduler.run_cycle().unwrap();

    assert_eq!(scheduler.store().corpus_size("foo").unwrap(), 5);
    assert_eq!(scheduler.client().action_count(), 0);
}

#[test]
fn test_fatal_error_mid_backfill_restarts_next_cycle() {
    let platform = InMemoryPlatform::new();
    script_backfill(&platform, "foo", [3, 2, 1]);
    platform.set_top("foo", TimeWindow::Month, Vec::new());
    platform.push_top_error("foo", TimeWindow::Month, PlatformError::ServerError("503".into()));
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();

    let err = scheduler.run_cycle().unwrap_err();
    assert!(err.is_fatal());
    assert!(!indexed(&scheduler, "foo"));
    assert_eq!(scheduler.store().corpus_size("foo").unwrap(), 5);

    // The outage clears; the month window now has its submission.
    let late = image_post("foo6", "foo", T0 + 6);
    scheduler.client().add_media(&late.url, grid_png(6));
    scheduler.client().set_top("foo", TimeWindow::Month, vec![late]);

    let cycle = scheduler.run_cycle().unwrap();
    assert!(cycle.scans[0].completed);
    assert!(indexed(&scheduler, "foo"));
    assert_eq!(scheduler.store().corpus_size("foo").unwrap(), 6);
    assert_eq!(scheduler.client().fetch_count("https://i.redd.it/foo1.png"), 1);
    assert_eq!(scheduler.client().action_count(), 0);
}

#[test]
fn test_monitoring_reports_repost() {
    let platform = InMemoryPlatform::new();
    let original = image_post("orig", "foo", T0);
    platform.add_media(&original.url, grid_png(7));
    platform.set_top("foo", TimeWindow::All, vec![original]);
    platform.set_live_state("orig", active_state("orig"));
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();
    scheduler.run_cycle().unwrap();
    assert!(indexed(&scheduler, "foo"));

    let repost = image_post("dup", "foo", T0 + DAY);
    let unrelated = image_post("fresh", "foo", T0 + DAY);
    scheduler.client().add_media(&repost.url, grid_png(7));
    scheduler.client().add_media(&unrelated.url, grid_png(8));
    scheduler.client().set_new("foo", vec![repost, unrelated]);

    let cycle = scheduler.run_cycle().unwrap();

    assert_eq!(cycle.scans[0].mode, ScanMode::Monitor);
    assert_eq!(cycle.scans[0].reported, 1);
    let reports = scheduler.client().reports();
    assert_eq!(
        reports,
        vec![(
            SubmissionId::new("dup"),
            "Possible repost ( 1 matches | 0 removed/deleted )".to_string()
        )]
    );
    let replies = scheduler.client().replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].body.contains("[original orig](https://redd.it/orig)"));
    assert!(replies[0].body.contains("| Active | 100%"));
    assert_eq!(scheduler.store().corpus_size("foo").unwrap(), 3);
    assert!(scheduler.client().removed_submissions().is_empty());

    // Already in the ledger: the next cycle takes no further action.
    scheduler.run_cycle().unwrap();
    assert_eq!(scheduler.client().reports().len(), 1);
}

fn monitored_with_original(registry: ConfigRegistry, repost_age_days: i64) -> Scheduler {
    let platform = InMemoryPlatform::new();
    let original = image_post("orig", "foo", T0);
    platform.add_media(&original.url, grid_png(11));
    platform.set_top("foo", TimeWindow::All, vec![original]);
    let mut scheduler = scheduler_with(platform, registry);
    scheduler.store().add_community("foo").unwrap();
    scheduler.run_cycle().unwrap();

    let repost = image_post("dup", "foo", T0 + repost_age_days * DAY);
    scheduler.client().add_media(&repost.url, grid_png(11));
    scheduler.client().set_new("foo", vec![repost]);
    scheduler
}

fn registry(config: CommunityConfig) -> ConfigRegistry {
    let mut registry = ConfigRegistry::new();
    registry.insert("foo", config);
    registry
}

#[test]
fn test_autoremove_fires_when_enabled() {
    let config = CommunityConfig {
        autoremove: true,
        autoremove_threshold: 95,
        ..CommunityConfig::default()
    };
    let mut scheduler = monitored_with_original(registry(config), 1);

    scheduler.run_cycle().unwrap();

    let client = scheduler.client();
    assert_eq!(client.removed_submissions().len(), 1);
    assert_eq!(client.removed_submissions()[0].0, SubmissionId::new("dup"));
    let replies = client.replies();
    assert_eq!(replies.len(), 2);
    assert_eq!(client.distinguished(), vec![(replies[1].id.clone(), true)]);
}

#[test]
fn test_autoremove_off_only_reports() {
    let mut scheduler = monitored_with_original(registry(CommunityConfig::default()), 1);

    scheduler.run_cycle().unwrap();

    assert_eq!(scheduler.client().reports().len(), 1);
    assert!(scheduler.client().removed_submissions().is_empty());
}

#[test]
fn test_max_post_age_filters_old_originals() {
    let limited = CommunityConfig {
        max_post_age: 30,
        ..CommunityConfig::default()
    };
    let mut scheduler = monitored_with_original(registry(limited), 40);
    scheduler.run_cycle().unwrap();
    assert!(scheduler.client().reports().is_empty());
    assert!(scheduler.store().get_fingerprint(&SubmissionId::new("dup")).unwrap().is_some());

    let unlimited = CommunityConfig {
        max_post_age: 0,
        ..CommunityConfig::default()
    };
    let mut scheduler = monitored_with_original(registry(unlimited), 4000);
    scheduler.run_cycle().unwrap();
    assert_eq!(scheduler.client().reports().len(), 1);
}

#[test]
fn test_reporting_failures_do_not_block_the_ledger() {
    let mut scheduler = monitored_with_original(registry(CommunityConfig::default()), 1);
    scheduler
        .client()
        .fail_reports(PlatformError::Forbidden("report".into()));
    scheduler
        .client()
        .fail_replies(PlatformError::RateLimited { retry_after_secs: Some(60) });

    scheduler.run_cycle().unwrap();

    let entry = scheduler
        .store()
        .get_entry(&SubmissionId::new("dup"))
        .unwrap()
        .unwrap();
    assert!(entry.processed);
}

#[test]
fn test_fetch_failure_is_recorded_once_and_never_retried() {
    let platform = InMemoryPlatform::new();
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();
    scheduler.store().mark_indexed("foo").unwrap();

    let broken = image_post("broken", "foo", T0);
    scheduler
        .client()
        .fail_media(&broken.url, PlatformError::NotFound(broken.url.clone()));
    scheduler.client().set_new("foo", vec![broken.clone()]);

    scheduler.run_cycle().unwrap();
    scheduler.run_cycle().unwrap();

    let store = scheduler.store();
    assert!(store.get_fingerprint(&broken.id).unwrap().is_none());
    assert_eq!(store.entry_count().unwrap(), 1);
    assert!(!store.get_entry(&broken.id).unwrap().unwrap().processed);
    assert_eq!(scheduler.client().fetch_count(&broken.url), 1);
    assert!(scheduler.sentry().ignored().contains(&broken.id));
}

#[test]
fn test_media_host_outage_skips_only_that_submission() {
    let platform = InMemoryPlatform::new();
    let broken = image_post("broken", "foo", T0);
    let good = image_post("good", "foo", T0 + 1);
    platform.fail_media(&broken.url, PlatformError::ServerError("502 Bad Gateway".into()));
    platform.add_media(&good.url, grid_png(5));
    platform.set_new("foo", vec![broken.clone(), good.clone()]);
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();
    scheduler.store().mark_indexed("foo").unwrap();

    let cycle = scheduler.run_cycle().unwrap();
    scheduler.run_cycle().unwrap();

    assert!(cycle.scans[0].completed);
    assert_eq!(cycle.scans[0].recorded, 1);
    let store = scheduler.store();
    assert!(!store.get_entry(&broken.id).unwrap().unwrap().processed);
    assert!(store.get_entry(&good.id).unwrap().unwrap().processed);
    assert_eq!(scheduler.client().fetch_count(&broken.url), 1);
    assert_eq!(scheduler.client().fetch_count(&good.url), 1);
}

#[test]
fn test_run_ends_on_server_error() {
    let platform = InMemoryPlatform::new();
    platform.push_new_error("foo", PlatformError::ServerError("502 Bad Gateway".into()));
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();
    scheduler.store().mark_indexed("foo").unwrap();

    let err = scheduler.run().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("502"));
}

#[test]
fn test_overlapping_scans_share_one_ledger_entry() {
    let platform = InMemoryPlatform::new();
    let store = SqliteStore::in_memory().unwrap();
    let post = image_post("racy", "foo", T0);
    platform.add_media(&post.url, grid_png(3));
    let config = test_config();
    let community = CommunityConfig::default();

    let (platform, store, post, config, community) =
        (&platform, &store, &post, &config, &community);
    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                scope.spawn(move || {
                    Sentry::from_config(config)
                        .handle_submission(platform, store, post, community, true)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for outcome in &outcomes {
        assert!(outcome.is_ok(), "overlapping scan failed: {outcome:?}");
    }
    assert!(outcomes.iter().any(|o| matches!(o, Ok(SentryOutcome::Recorded { .. }))));
    assert_eq!(store.entry_count().unwrap(), 1);
    assert_eq!(store.corpus_size("foo").unwrap(), 1);
}

#[test]
fn test_overlapping_scans_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.db");
    let first = SqliteStore::new(&path).unwrap();
    let second = SqliteStore::new(&path).unwrap();
    let platform = InMemoryPlatform::new();
    let post = image_post("shared", "foo", T0);
    platform.add_media(&post.url, grid_png(9));
    let config = test_config();
    let community = CommunityConfig::default();

    thread::scope(|scope| {
        for store in [&first, &second] {
            let (platform, post, config, community) = (&platform, &post, &config, &community);
            scope.spawn(move || {
                Sentry::from_config(config)
                    .handle_submission(platform, store, post, community, false)
                    .unwrap();
            });
        }
    });

    assert_eq!(first.entry_count().unwrap(), 1);
    assert_eq!(second.corpus_size("foo").unwrap(), 1);
}

#[test]
fn test_invite_removal_and_readd_restart_indexing() {
    let platform = InMemoryPlatform::new();
    script_backfill(&platform, "foo", [2, 1, 0]);
    platform.push_message(
        InboxMessage::direct("i1", "foo", "invitation to moderate /r/foo", "gadzooks!")
            .in_community("foo"),
    );
    let mut scheduler = scheduler(platform);

    let cycle = scheduler.run_cycle().unwrap();
    assert_eq!(cycle.messages, 1);
    assert!(indexed(&scheduler, "foo"));
    assert!(scheduler.client().config_page("foo").is_some());
    assert_eq!(scheduler.store().corpus_size("foo").unwrap(), 3);

    scheduler.client().push_message(
        InboxMessage::direct("r1", "foo", "removed", "You have been removed as a moderator from /r/foo")
            .in_community("foo"),
    );
    let cycle = scheduler.run_cycle().unwrap();
    assert!(cycle.scans.is_empty());
    assert!(scheduler.store().get_community("foo").unwrap().is_none());
    assert_eq!(scheduler.store().corpus_size("foo").unwrap(), 3);
    assert!(!scheduler.registry().contains("foo"));

    scheduler.client().push_message(
        InboxMessage::direct("i2", "foo", "invitation to moderate /r/foo", "gadzooks!")
            .in_community("foo"),
    );
    let cycle = scheduler.run_cycle().unwrap();
    assert_eq!(cycle.scans[0].mode, ScanMode::Backfill);
    assert!(indexed(&scheduler, "foo"));
    assert_eq!(scheduler.client().fetch_count("https://i.redd.it/foo1.png"), 1);
    assert_eq!(scheduler.client().action_count(), 0);
}

#[test]
fn test_mentions_distinguish_no_data_from_no_matches() {
    let platform = InMemoryPlatform::new();
    let original = image_post("orig", "foo", T0);
    platform.add_media(&original.url, grid_png(21));
    platform.set_top("foo", TimeWindow::All, vec![original]);
    let mut scheduler = scheduler(platform);
    scheduler.store().add_community("foo").unwrap();
    scheduler.run_cycle().unwrap();

    let mention = |id: &str, submission: &str| {
        InboxMessage::direct(id, "curious", "username mention", "u/reposentry seen this?")
            .in_community("foo")
            .under_submission(submission)
    };
    scheduler.client().push_message(mention("m1", "orig"));
    scheduler.client().push_message(mention("m2", "never_seen"));
    scheduler.run_cycle().unwrap();

    let replies = scheduler.client().message_replies();
    let reply_to = |id: &str| {
        replies
            .iter()
            .find(|(m, _)| m.as_str() == id)
            .map(|(_, text)| text.clone())
            .unwrap()
    };
    let templates = test_config().templates;
    assert!(reply_to("m1").starts_with(&templates.mention_no_matches));
    assert!(reply_to("m2").starts_with(&templates.mention_no_data));
    assert_eq!(scheduler.client().action_count(), 0);
}
