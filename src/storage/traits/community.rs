//! Community table trait.

use crate::Result;
use crate::models::Community;

/// Persistence for the set of monitored communities.
///
/// Only the `indexed` flag is durable: a community is either `Unindexed` or
/// `Indexed` when read back.
pub trait CommunityStore: Send + Sync {
    /// Adds a community as `Unindexed`.
    ///
    /// Returns `false` without changing anything if it already exists.
    fn add_community(&self, name: &str) -> Result<bool>;

    /// Drops a community from the active set.
    ///
    /// Its fingerprints stay in the corpus. Returns `false` if it was unknown.
    fn remove_community(&self, name: &str) -> Result<bool>;

    /// Returns a community by name.
    fn get_community(&self, name: &str) -> Result<Option<Community>>;

    /// Returns every community, ordered by name.
    fn list_communities(&self) -> Result<Vec<Community>>;

    /// Atomically flips a community to `Indexed`.
    ///
    /// Returns `false` if the community is unknown.
    fn mark_indexed(&self, name: &str) -> Result<bool>;
}
