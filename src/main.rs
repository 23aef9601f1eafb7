//! Binary entry point for reposentry.
//!
//! Administrative CLI over the hash engine and the fingerprint database.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use reposentry::observability;
use reposentry::platform::{DEFAULT_USER_AGENT, HttpFetchConfig, HttpMediaFetcher, is_remote};
use reposentry::{
    BotConfig, CommunityConfig, CommunityStore, DifferenceHasher, Fingerprint, Match, MediaStore,
    MentionMatcher, MentionOutcome, SqliteStore, SubmissionId, SubmissionLedger,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Reposentry - perceptual-hash repost detection for moderated communities.
#[derive(Parser)]
#[command(name = "reposentry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the fingerprint database (overrides the config file).
    #[arg(short, long, global = true, env = "REPOSENTRY_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of one or more image files or URLs.
    Hash {
        /// Image files or http(s) URLs.
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Print the similarity of two images or two hex fingerprints.
    Compare {
        /// First image file, URL, or fingerprint.
        a: String,

        /// Second image file, URL, or fingerprint.
        b: String,
    },

    /// Show known communities, their indexing state, and corpus sizes.
    Status,

    /// Manage the monitored communities.
    Community {
        /// Community subcommand.
        #[command(subcommand)]
        action: CommunityAction,
    },

    /// Query the corpus for matches of an indexed submission.
    Matches {
        /// Submission ID.
        submission_id: String,

        /// Minimum similarity, in percent.
        #[arg(short, long, default_value = "85")]
        threshold: u8,

        /// Maximum number of matches.
        #[arg(short, long, default_value = "25")]
        limit: usize,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Work with community configuration pages.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print a shell completion script.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Community subcommands.
#[derive(Subcommand)]
enum CommunityAction {
    /// Start monitoring a community (it begins unindexed).
    Add {
        /// Community name.
        name: String,
    },

    /// Stop monitoring a community. Its fingerprints are kept.
    Remove {
        /// Community name.
        name: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
enum ConfigAction {
    /// Parse a community config page and show what would be corrected.
    Check {
        /// Path to the page text.
        file: PathBuf,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match BotConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    let config = match &cli.database {
        Some(path) => config.with_database_path(path),
        None => config,
    };

    let logging = config
        .logging
        .clone()
        .with_verbose(cli.verbose)
        .with_env_overrides();
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = observability::install_prometheus(&config.metrics.with_env_overrides()) {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &BotConfig) -> anyhow::Result<()> {
    match command {
        Commands::Hash { sources } => cmd_hash(config, &sources),
        Commands::Compare { a, b } => cmd_compare(config, &a, &b),
        Commands::Status => cmd_status(config),
        Commands::Community { action } => cmd_community(config, action),
        Commands::Matches {
            submission_id,
            threshold,
            limit,
            json,
        } => cmd_matches(config, &SubmissionId::new(submission_id), threshold, limit, json),
        Commands::Config { action } => match action {
            ConfigAction::Check { file } => cmd_config_check(config, &file),
        },
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "reposentry", &mut std::io::stdout());
            Ok(())
        },
    }
}

/// Hashes local files and, when asked, remote media.
struct MediaHasher {
    hasher: DifferenceHasher,
    fetch_config: HttpFetchConfig,
    fetcher: Option<HttpMediaFetcher>,
}

impl MediaHasher {
    fn new(config: &BotConfig) -> Self {
        Self {
            hasher: DifferenceHasher::new().with_max_bytes(config.scan.max_media_bytes),
            fetch_config: HttpFetchConfig {
                max_bytes: config.scan.max_media_bytes,
                ..HttpFetchConfig::default()
            }
            .with_env_overrides(),
            fetcher: None,
        }
    }

    fn fetcher(&mut self) -> anyhow::Result<&HttpMediaFetcher> {
        if self.fetcher.is_none() {
            let fetcher = HttpMediaFetcher::new(DEFAULT_USER_AGENT, self.fetch_config)
                .context("building HTTP client")?;
            self.fetcher = Some(fetcher);
        }
        self.fetcher.as_ref().context("HTTP client unavailable")
    }

    fn read(&mut self, source: &str) -> anyhow::Result<Vec<u8>> {
        if is_remote(source) {
            return self
                .fetcher()?
                .fetch(source)
                .with_context(|| format!("fetching {source}"));
        }
        std::fs::read(source).with_context(|| format!("reading {source}"))
    }

    fn hash(&mut self, source: &str) -> anyhow::Result<Fingerprint> {
        let bytes = self.read(source)?;
        self.hasher
            .hash_bytes(&bytes)
            .with_context(|| format!("hashing {source}"))
    }

    /// Reads an argument as media if it is a URL or an existing file,
    /// otherwise as hex.
    fn fingerprint_arg(&mut self, arg: &str) -> anyhow::Result<Fingerprint> {
        if is_remote(arg) || Path::new(arg).exists() {
            return self.hash(arg);
        }
        arg.parse::<Fingerprint>()
            .with_context(|| format!("{arg} is neither a file, a URL, nor a fingerprint"))
    }
}

fn open_store(config: &BotConfig) -> anyhow::Result<SqliteStore> {
    SqliteStore::new(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))
}

fn cmd_hash(config: &BotConfig, sources: &[String]) -> anyhow::Result<()> {
    let mut media = MediaHasher::new(config);
    let mut failed = 0usize;
    for source in sources {
        match media.hash(source) {
            Ok(fingerprint) => println!("{fingerprint}  {source}"),
            Err(e) => {
                failed += 1;
                eprintln!("{e:#}");
            },
        }
    }
    if failed > 0 {
        bail!("{failed} of {} sources could not be hashed", sources.len());
    }
    Ok(())
}

fn cmd_compare(config: &BotConfig, a: &str, b: &str) -> anyhow::Result<()> {
    let mut media = MediaHasher::new(config);
    let a = media.fingerprint_arg(a)?;
    let b = media.fingerprint_arg(b)?;
    println!("{a}");
    println!("{b}");
    println!(
        "similarity: {}% (hamming distance {})",
        a.similarity(&b),
        a.hamming_distance(&b)
    );
    Ok(())
}

fn cmd_status(config: &BotConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    println!("Reposentry Status");
    println!("=================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Hash version: {}", reposentry::HASH_VERSION);
    println!("Database: {}", config.database_path.display());
    println!("Ledger entries: {}", store.entry_count()?);
    println!();

    let communities = store.list_communities()?;
    if communities.is_empty() {
        println!("No communities.");
        return Ok(());
    }

    println!("{:<24} {:<12} {:>12}", "Community", "State", "Fingerprints");
    for community in communities {
        println!(
            "{:<24} {:<12} {:>12}",
            community.name,
            community.state.as_str(),
            store.corpus_size(&community.name)?
        );
    }
    Ok(())
}

fn cmd_community(config: &BotConfig, action: CommunityAction) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match action {
        CommunityAction::Add { name } => {
            if store.add_community(&name)? {
                println!("Added {name} (unindexed)");
            } else {
                println!("{name} is already monitored");
            }
        },
        CommunityAction::Remove { name } => {
            if store.remove_community(&name)? {
                println!("Removed {name}; its fingerprints are kept");
            } else {
                println!("{name} is not monitored");
            }
        },
    }
    Ok(())
}

/// JSON shape of `matches` output.
#[derive(Serialize)]
struct MatchesReport<'a> {
    submission_id: &'a SubmissionId,
    status: &'static str,
    threshold: u8,
    matches: Vec<Match>,
}

fn cmd_matches(
    config: &BotConfig,
    submission_id: &SubmissionId,
    threshold: u8,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    if threshold > 100 {
        bail!("threshold must be between 0 and 100");
    }
    let store = open_store(config)?;
    let lookup = CommunityConfig {
        mentioned_threshold: threshold,
        ..CommunityConfig::default()
    };
    let outcome = MentionMatcher::from_config(config)
        .with_limit(limit)
        .find(&store, submission_id, &lookup)?;

    if json {
        let matches = match &outcome {
            MentionOutcome::Matches(matches) => matches.clone(),
            MentionOutcome::NoData | MentionOutcome::NoMatches => Vec::new(),
        };
        let report = MatchesReport {
            submission_id,
            status: outcome.as_str(),
            threshold,
            matches,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match outcome {
        MentionOutcome::NoData => println!("No data: {submission_id} has not been indexed"),
        MentionOutcome::NoMatches => {
            println!("No matches at {threshold}% or above for {submission_id}");
        },
        MentionOutcome::Matches(matches) => {
            println!("{:<12} {:>10}  {:<16} {}", "Submission", "Similarity", "Fingerprint", "Posted");
            for m in &matches {
                println!(
                    "{:<12} {:>9}%  {:<16} {}",
                    m.record.submission_id,
                    m.similarity,
                    m.record.hash,
                    reposentry::services::format_timestamp(m.record.created_at)
                );
            }
        },
    }
    Ok(())
}

fn cmd_config_check(config: &BotConfig, file: &Path) -> anyhow::Result<()> {
    let text =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let mut page = CommunityConfig::from_toml_str(&text)?;
    let corrected = page.enforce_limits(&config.limits);

    if corrected.is_empty() {
        println!("OK: every value is within limits");
    } else {
        println!("Corrected to defaults: {}", corrected.join(", "));
    }
    println!();
    print!("{}", page.to_toml_string()?);
    Ok(())
}
