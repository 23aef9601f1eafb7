//! Inbox message classification and dispatch.
//!
//! Each unread message is classified once into an [`InboxCommand`], then
//! handled by the matching arm of [`InboxHandler::dispatch`]:
//!
//! ```text
//! InboxCommand
//!   ├── Invite { community }
//!   ├── ModeratorRemoval { community }
//!   ├── Mention { community, submission }
//!   ├── Command { kind: CommandKind, community }
//!   │     ├── Update
//!   │     └── Defaults
//!   └── Ignore
//! ```
//!
//! To add a direct-message command, add a [`CommandKind`] variant, a row in
//! its command table, and an arm in [`InboxHandler::run_command`].

use super::MentionMatcher;
use crate::config::{BotConfig, CommunityConfig, ConfigRegistry, LimitsConfig};
use crate::models::SubmissionId;
use crate::platform::{InboxMessage, PlatformClient, PlatformError};
use crate::storage::{CommunityStore, MediaStore};
use crate::{Error, Result};
use std::fmt;
use tracing::instrument;

/// Reply when a command names a community the bot does not moderate.
pub const REPLY_NOT_MODERATING: &str = "I don't currently moderate that community.";
/// Reply when the sender does not moderate the community.
pub const REPLY_NOT_A_MODERATOR: &str = "You don't moderate that community.";
/// Reply after a successful config refresh.
pub const REPLY_UPDATED: &str = "Successfully updated your community's config!";
/// Reply after the default config page was written.
pub const REPLY_DEFAULTS: &str = "Successfully created or reset your community's config!";
/// Reply when the config page cannot be read or written.
pub const REPLY_FORBIDDEN: &str =
    "I don't have permission to access the config page, no changes have been made.";
/// Reply when the config page does not exist.
pub const REPLY_NO_PAGE: &str = "No config page currently exists, no changes have been made.";

const INVITE_PREFIXES: [&str; 2] = ["**gadzooks!", "gadzooks!"];
const INVITE_SUBJECT: &str = "invitation to moderate";
const REMOVAL_BODY: &str = "You have been removed as a moderator from ";
const MENTION_SUBJECT: &str = "username mention";

/// A direct-message command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Reload the community's config page.
    Update,
    /// Overwrite the config page with the defaults.
    Defaults,
}

impl CommandKind {
    const TABLE: [(&'static str, Self); 2] = [("update", Self::Update), ("defaults", Self::Defaults)];

    /// Returns the command word.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Defaults => "defaults",
        }
    }

    /// Returns every known command.
    #[must_use]
    pub const fn known() -> [Self; 2] {
        [Self::Update, Self::Defaults]
    }

    /// Looks up a message body in the command table.
    ///
    /// Matching ignores case and surrounding whitespace.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let word = body.trim().to_lowercase();
        Self::TABLE
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an inbox message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxCommand {
    /// Invitation to moderate a community.
    Invite {
        /// Inviting community.
        community: String,
    },
    /// The bot lost moderator status.
    ModeratorRemoval {
        /// Community that removed the bot.
        community: String,
    },
    /// A user mentioned the bot under a submission.
    Mention {
        /// Community of the submission.
        community: String,
        /// Submission the mention was made under.
        submission: SubmissionId,
    },
    /// A moderator command sent by direct message.
    Command {
        /// Which command.
        kind: CommandKind,
        /// Community the command targets.
        community: String,
    },
    /// Nothing to do.
    Ignore,
}

impl InboxCommand {
    /// Classifies a message.
    ///
    /// Community messages are invites, removals, or mentions. Direct messages
    /// are commands when the body is a command word; the target community is
    /// the name after the last `r/` in the subject.
    #[must_use]
    pub fn classify(message: &InboxMessage) -> Self {
        let subject = message.subject.to_lowercase();

        if let Some(community) = &message.community {
            if subject.contains(MENTION_SUBJECT) {
                return message.submission.as_ref().map_or(Self::Ignore, |submission| {
                    Self::Mention {
                        community: community.clone(),
                        submission: submission.clone(),
                    }
                });
            }
            if INVITE_PREFIXES.iter().any(|p| message.body.starts_with(p))
                || subject.contains(INVITE_SUBJECT)
            {
                return Self::Invite {
                    community: community.clone(),
                };
            }
            if message.body.contains(REMOVAL_BODY) {
                return Self::ModeratorRemoval {
                    community: community.clone(),
                };
            }
            return Self::Ignore;
        }

        let Some(kind) = CommandKind::parse(&message.body) else {
            return Self::Ignore;
        };
        community_from_subject(&message.subject)
            .map_or(Self::Ignore, |community| Self::Command { kind, community })
    }

    /// Returns the classification label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Invite { .. } => "invite",
            Self::ModeratorRemoval { .. } => "moderator_removal",
            Self::Mention { .. } => "mention",
            Self::Command { .. } => "command",
            Self::Ignore => "ignore",
        }
    }
}

fn community_from_subject(subject: &str) -> Option<String> {
    let (_, tail) = subject.rsplit_once("r/")?;
    let name: String = tail
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

/// Parses a config page and enforces `limits`.
///
/// Returns `None`, after logging, if the page cannot be parsed.
pub fn parse_config_page(
    community: &str,
    text: &str,
    limits: &LimitsConfig,
) -> Option<CommunityConfig> {
    match CommunityConfig::from_toml_str(text) {
        Ok(mut config) => {
            config.enforce_limits(limits);
            Some(config)
        },
        Err(e) => {
            tracing::warn!(community, error = %e, "Invalid config page, using defaults");
            None
        },
    }
}

/// Handles the bot's inbox between community scans.
#[derive(Debug, Clone)]
pub struct InboxHandler {
    limits: LimitsConfig,
    mention: MentionMatcher,
}

impl InboxHandler {
    /// Creates a handler.
    #[must_use]
    pub const fn new(limits: LimitsConfig, mention: MentionMatcher) -> Self {
        Self { limits, mention }
    }

    /// Creates a handler from the bot configuration.
    #[must_use]
    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.limits, MentionMatcher::from_config(config))
    }

    /// Handles every unread message and marks it read.
    ///
    /// Returns the number of messages handled. A recoverable failure on one
    /// message is logged and the message is still marked read.
    ///
    /// # Errors
    ///
    /// Returns storage failures and fatal platform errors. The message being
    /// handled stays unread.
    #[instrument(skip_all, fields(operation = "process_inbox"))]
    pub fn process<P, S>(&self, client: &P, store: &S, registry: &mut ConfigRegistry) -> Result<usize>
    where
        P: PlatformClient + ?Sized,
        S: CommunityStore + MediaStore + ?Sized,
    {
        let messages = match client.unread_messages() {
            Ok(messages) => messages,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read inbox");
                return Ok(0);
            },
        };

        let mut handled = 0;
        for message in &messages {
            let command = InboxCommand::classify(message);
            match self.dispatch(client, store, registry, message, &command) {
                Ok(()) => {},
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        message_id = %message.id,
                        command = command.as_str(),
                        error = %e,
                        "Inbox message failed"
                    );
                },
            }

            match client.mark_read(&message.id) {
                Ok(()) => {},
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => tracing::warn!(message_id = %message.id, error = %e, "Could not mark read"),
            }
            handled += 1;
        }

        if handled > 0 {
            metrics::counter!("inbox_messages_total").increment(u64::try_from(handled).unwrap_or(u64::MAX));
        }
        Ok(handled)
    }

    /// Handles one classified message.
    ///
    /// # Errors
    ///
    /// Returns storage and platform errors raised by the handler.
    pub fn dispatch<P, S>(
        &self,
        client: &P,
        store: &S,
        registry: &mut ConfigRegistry,
        message: &InboxMessage,
        command: &InboxCommand,
    ) -> Result<()>
    where
        P: PlatformClient + ?Sized,
        S: CommunityStore + MediaStore + ?Sized,
    {
        match command {
            InboxCommand::Invite { community } => self.accept_invite(client, store, registry, community),
            InboxCommand::ModeratorRemoval { community } => {
                store.remove_community(community)?;
                registry.remove(community);
                tracing::info!(community = %community, "Removed as moderator");
                Ok(())
            },
            InboxCommand::Mention {
                community,
                submission,
            } => {
                if store.get_community(community)?.is_none() {
                    return Ok(());
                }
                let config = registry.snapshot(community);
                if !config.respond_to_mentions {
                    return Ok(());
                }
                let (_, reply) = self.mention.respond(client, store, submission, &config)?;
                client.reply_to_message(&message.id, &reply)?;
                Ok(())
            },
            InboxCommand::Command { kind, community } => {
                self.run_command(client, store, registry, message, *kind, community)
            },
            InboxCommand::Ignore => Ok(()),
        }
    }

    fn accept_invite<P, S>(
        &self,
        client: &P,
        store: &S,
        registry: &mut ConfigRegistry,
        community: &str,
    ) -> Result<()>
    where
        P: PlatformClient + ?Sized,
        S: CommunityStore + ?Sized,
    {
        client.accept_invite(community)?;
        store.add_community(community)?;
        tracing::info!(community, "Accepted moderator invite");

        let config = match client.fetch_config_page(community) {
            Ok(Some(text)) => parse_config_page(community, &text, &self.limits).unwrap_or_default(),
            Ok(None) => {
                let page = CommunityConfig::default().to_toml_string()?;
                match client.write_config_page(community, &page) {
                    Ok(()) => {},
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => tracing::warn!(community, error = %e, "Could not create config page"),
                }
                CommunityConfig::default()
            },
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(community, error = %e, "Could not read config page");
                CommunityConfig::default()
            },
        };
        registry.insert(community, config);
        Ok(())
    }

    fn run_command<P, S>(
        &self,
        client: &P,
        store: &S,
        registry: &mut ConfigRegistry,
        message: &InboxMessage,
        kind: CommandKind,
        community: &str,
    ) -> Result<()>
    where
        P: PlatformClient + ?Sized,
        S: CommunityStore + ?Sized,
    {
        if store.get_community(community)?.is_none() {
            client.reply_to_message(&message.id, REPLY_NOT_MODERATING)?;
            return Ok(());
        }

        let sender_moderates = match &message.author {
            Some(author) => client.is_moderator(author, community)?,
            None => false,
        };
        if !sender_moderates {
            client.reply_to_message(&message.id, REPLY_NOT_A_MODERATOR)?;
            return Ok(());
        }

        let reply = match kind {
            CommandKind::Update => self.update(client, registry, community)?,
            CommandKind::Defaults => Self::restore_defaults(client, registry, community)?,
        };
        tracing::info!(community, command = kind.as_str(), "Ran moderator command");
        client.reply_to_message(&message.id, &reply)?;
        Ok(())
    }

    fn update<P: PlatformClient + ?Sized>(
        &self,
        client: &P,
        registry: &mut ConfigRegistry,
        community: &str,
    ) -> Result<String> {
        let text = match client.fetch_config_page(community) {
            Ok(Some(text)) => text,
            Ok(None) => return Ok(REPLY_NO_PAGE.to_string()),
            Err(PlatformError::Forbidden(_)) => return Ok(REPLY_FORBIDDEN.to_string()),
            Err(e) => return Err(e.into()),
        };

        let mut config = match CommunityConfig::from_toml_str(&text) {
            Ok(config) => config,
            Err(Error::InvalidInput(reason)) => {
                return Ok(format!("Your config page could not be read, no changes have been made: {reason}"));
            },
            Err(e) => return Err(e),
        };
        let corrected = config.enforce_limits(&self.limits);
        registry.insert(community, config);

        Ok(if corrected.is_empty() {
            REPLY_UPDATED.to_string()
        } else {
            format!(
                "{REPLY_UPDATED} These values were out of range and use their defaults: {}",
                corrected
                    .iter()
                    .map(|field| format!("`{field}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
    }

    fn restore_defaults<P: PlatformClient + ?Sized>(
        client: &P,
        registry: &mut ConfigRegistry,
        community: &str,
    ) -> Result<String> {
        let page = CommunityConfig::default().to_toml_string()?;
        match client.write_config_page(community, &page) {
            Ok(()) => {},
            Err(PlatformError::Forbidden(_)) => return Ok(REPLY_FORBIDDEN.to_string()),
            Err(e) => return Err(e.into()),
        }
        registry.insert(community, CommunityConfig::default());
        Ok(REPLY_DEFAULTS.to_string())
    }
}
