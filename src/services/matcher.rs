//! Ranking of corpus matches.
//!
//! The store streams matches in no particular order. The matcher keeps only
//! the best `limit` of them in a bounded min-heap, so ranking a corpus of any
//! size holds at most `limit` matches plus one store page in memory.

use crate::hashing::Fingerprint;
use crate::models::{Match, SubmissionId};
use crate::storage::MediaStore;
use crate::Result;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;
use tracing::instrument;

/// Default number of matches kept per query.
pub const DEFAULT_TOP_MATCHES: usize = 25;

/// Selects the best matches for a fingerprint.
///
/// Ranking order: similarity descending, then newer originals first, then
/// submission ID ascending so equal matches rank deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matcher {
    limit: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_MATCHES)
    }
}

impl Matcher {
    /// Creates a matcher that keeps at most `limit` matches.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Maximum number of matches returned.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Queries `store` and returns the ranked top matches.
    ///
    /// # Errors
    ///
    /// Returns the first storage error raised while streaming the corpus.
    #[instrument(
        skip(self, store, fingerprint, exclude),
        fields(operation = "top_matches", submission_id = %exclude)
    )]
    pub fn top_matches<S: MediaStore + ?Sized>(
        &self,
        store: &S,
        community: &str,
        fingerprint: Fingerprint,
        exclude: &SubmissionId,
        min_similarity: u8,
    ) -> Result<Vec<Match>> {
        let start = Instant::now();
        let mut stream = store.find_matches(community, fingerprint, exclude, min_similarity);
        let ranked = self.rank(stream.by_ref());
        let scanned = stream.scanned();
        stream.close();

        metrics::histogram!("matcher_query_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            scanned,
            kept = ranked.as_ref().map_or(0, Vec::len),
            "Ranked corpus matches"
        );
        ranked
    }

    /// Ranks a stream of matches, keeping the best `limit`.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first `Err` in the stream.
    pub fn rank<I>(&self, matches: I) -> Result<Vec<Match>>
    where
        I: IntoIterator<Item = Result<Match>>,
    {
        if self.limit == 0 {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(self.limit + 1);
        for item in matches {
            heap.push(Reverse(Ranked(item?)));
            if heap.len() > self.limit {
                heap.pop();
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(Ranked(m))| m)
            .collect())
    }
}

/// A match ordered so that better matches compare greater.
#[derive(Debug, PartialEq, Eq)]
struct Ranked(Match);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .similarity
            .cmp(&other.0.similarity)
            .then(self.0.record.created_at.cmp(&other.0.record.created_at))
            .then_with(|| other.0.record.submission_id.cmp(&self.0.record.submission_id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
