//! Per-community configuration.

use super::LimitsConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the configuration page each community keeps.
pub const CONFIG_PAGE_NAME: &str = "reposentry_config";

/// Thresholds and flags a community's moderators control.
///
/// Every field has a default, so a page may set any subset. Thresholds are
/// similarity percentages compared inclusively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Answer username mentions with a match table.
    #[serde(alias = "respond_to_mentioned")]
    pub respond_to_mentions: bool,
    /// Minimum similarity listed in mention replies.
    pub mentioned_threshold: u8,
    /// Minimum similarity that triggers a report.
    pub sentry_threshold: u8,
    /// Remove the evidence reply right after posting it.
    pub remove_sentry_comments: bool,
    /// Ignore matches older than this many days (0 = no limit).
    pub max_post_age: u32,
    /// Remove reposts automatically.
    pub autoremove: bool,
    /// Minimum similarity of every surviving match for automatic removal.
    pub autoremove_threshold: u8,
    /// Explain automatic removals with a pinned reply.
    pub autoremove_reply: bool,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            respond_to_mentions: true,
            mentioned_threshold: 85,
            sentry_threshold: 90,
            remove_sentry_comments: false,
            max_post_age: 180,
            autoremove: false,
            autoremove_threshold: 95,
            autoremove_reply: true,
        }
    }
}

impl CommunityConfig {
    /// Parses a configuration page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the page is not valid TOML or a
    /// field has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::InvalidInput(format!("invalid config page: {e}")))
    }

    /// Renders the configuration as a page.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::OperationFailed {
            operation: "serialize_community_config".to_string(),
            cause: e.to_string(),
        })
    }

    /// Replaces out-of-range thresholds with their defaults.
    ///
    /// A threshold is out of range when it is below its floor or above 100.
    /// The replacement is never lower than the floor. Returns the names of
    /// the corrected fields.
    pub fn enforce_limits(&mut self, limits: &LimitsConfig) -> Vec<&'static str> {
        let defaults = Self::default();
        let mut corrected = Vec::new();

        let checks: [(&'static str, &mut u8, u8, u8); 3] = [
            (
                "mentioned_threshold",
                &mut self.mentioned_threshold,
                defaults.mentioned_threshold,
                limits.minimum_threshold_allowed,
            ),
            (
                "sentry_threshold",
                &mut self.sentry_threshold,
                defaults.sentry_threshold,
                limits.minimum_threshold_allowed,
            ),
            (
                "autoremove_threshold",
                &mut self.autoremove_threshold,
                defaults.autoremove_threshold,
                limits.minimum_autoremove_threshold,
            ),
        ];

        for (name, value, default, floor) in checks {
            if *value < floor || *value > 100 {
                let replacement = default.max(floor).min(100);
                tracing::warn!(
                    field = name,
                    value = *value,
                    floor,
                    replacement,
                    "Threshold out of range, using default"
                );
                *value = replacement;
                corrected.push(name);
            }
        }

        corrected
    }
}

/// Owner of the per-community configuration snapshots.
///
/// Built once at startup and passed to the services that need it; entries
/// change only when a community is added, removed, or asks for a refresh.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    configs: HashMap<String, CommunityConfig>,
}

impl ConfigRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an owned snapshot for `community`, or the defaults if unknown.
    #[must_use]
    pub fn snapshot(&self, community: &str) -> CommunityConfig {
        self.configs.get(community).cloned().unwrap_or_default()
    }

    /// Returns the stored configuration, if any.
    #[must_use]
    pub fn get(&self, community: &str) -> Option<&CommunityConfig> {
        self.configs.get(community)
    }

    /// Stores the configuration for `community`, replacing any previous one.
    pub fn insert(&mut self, community: impl Into<String>, config: CommunityConfig) {
        self.configs.insert(community.into(), config);
    }

    /// Drops the configuration for `community`.
    pub fn remove(&mut self, community: &str) -> Option<CommunityConfig> {
        self.configs.remove(community)
    }

    /// Returns true if a configuration is stored for `community`.
    #[must_use]
    pub fn contains(&self, community: &str) -> bool {
        self.configs.contains_key(community)
    }

    /// Number of stored configurations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns true if no configuration is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
