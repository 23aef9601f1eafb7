//! Fingerprint corpus trait and streaming match queries.
//!
//! Corpora are unbounded, so [`MediaStore::find_matches`] never loads a
//! community's fingerprints at once. It returns a [`MatchStream`] that pulls
//! one keyset page at a time:
//!
//! ```text
//! page 1: rowid > 0      LIMIT n ──▶ score, filter, yield ──┐
//! page 2: rowid > last₁  LIMIT n ──▶ score, filter, yield   │ one page
//! ...                                                       │ resident
//! short page ──▶ exhausted ──▶ None ◀───────────────────────┘
//! ```

use crate::hashing::Fingerprint;
use crate::models::{FingerprintRecord, Match, SubmissionId};
use crate::Result;
use std::collections::VecDeque;

/// Rows fetched per page by [`MatchStream`].
pub const DEFAULT_PAGE_SIZE: usize = 512;

/// Parameters of a similarity query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchQuery {
    /// Community whose corpus is searched.
    pub community: String,
    /// Fingerprint compared against the corpus.
    pub fingerprint: Fingerprint,
    /// Submission excluded from the results (normally the query's own).
    pub exclude: SubmissionId,
    /// Inclusive similarity floor.
    pub min_similarity: u8,
}

/// Append-only per-community fingerprint corpus.
pub trait MediaStore: Send + Sync {
    /// Appends a fingerprint.
    ///
    /// Never overwrites: returns `false` if the submission already has one.
    fn record(&self, record: &FingerprintRecord) -> Result<bool>;

    /// Returns the fingerprint recorded for a submission.
    fn get_fingerprint(&self, submission_id: &SubmissionId) -> Result<Option<FingerprintRecord>>;

    /// Returns up to `limit` records of `community` with a row key above
    /// `after`, ordered by row key, skipping `exclude`.
    fn fetch_page(
        &self,
        community: &str,
        exclude: &SubmissionId,
        after: i64,
        limit: usize,
    ) -> Result<Vec<(i64, FingerprintRecord)>>;

    /// Number of fingerprints in a community's corpus.
    fn corpus_size(&self, community: &str) -> Result<usize>;

    /// Streams the records of `community` whose similarity to `fingerprint`
    /// is at least `min_similarity`, excluding `exclude`.
    ///
    /// The stream is lazy, finite, and restartable. No ordering is promised.
    fn find_matches(
        &self,
        community: &str,
        fingerprint: Fingerprint,
        exclude: &SubmissionId,
        min_similarity: u8,
    ) -> MatchStream<'_, Self> {
        MatchStream::new(
            self,
            MatchQuery {
                community: community.to_string(),
                fingerprint,
                exclude: exclude.clone(),
                min_similarity,
            },
        )
    }
}

/// Lazy iterator over the matches of a [`MatchQuery`].
///
/// Yields `Err` once and then ends if a page cannot be fetched.
pub struct MatchStream<'a, S: MediaStore + ?Sized> {
    store: &'a S,
    query: MatchQuery,
    page_size: usize,
    cursor: i64,
    page: VecDeque<FingerprintRecord>,
    exhausted: bool,
    closed: bool,
    scanned: usize,
}

impl<'a, S: MediaStore + ?Sized> MatchStream<'a, S> {
    /// Creates a stream positioned before the first record.
    #[must_use]
    pub fn new(store: &'a S, query: MatchQuery) -> Self {
        Self {
            store,
            query,
            page_size: DEFAULT_PAGE_SIZE,
            cursor: 0,
            page: VecDeque::new(),
            exhausted: false,
            closed: false,
            scanned: 0,
        }
    }

    /// Sets the number of rows fetched per page (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the query this stream answers.
    #[must_use]
    pub const fn query(&self) -> &MatchQuery {
        &self.query
    }

    /// Number of records compared so far.
    #[must_use]
    pub const fn scanned(&self) -> usize {
        self.scanned
    }

    /// Rewinds to the first record. Records appended since are included.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.page.clear();
        self.exhausted = false;
        self.closed = false;
        self.scanned = 0;
    }

    /// Ends the stream early and releases the buffered page.
    pub fn close(&mut self) {
        if !self.closed {
            tracing::debug!(
                community = %self.query.community,
                scanned = self.scanned,
                "Match stream closed"
            );
        }
        self.closed = true;
        self.page = VecDeque::new();
    }

    fn fill_page(&mut self) -> Result<()> {
        let rows = self.store.fetch_page(
            &self.query.community,
            &self.query.exclude,
            self.cursor,
            self.page_size,
        )?;
        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = rows.last() {
            self.cursor = *last;
        }
        self.page.extend(rows.into_iter().map(|(_, record)| record));
        Ok(())
    }
}

impl<S: MediaStore + ?Sized> Iterator for MatchStream<'_, S> {
    type Item = Result<Match>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.closed {
                return None;
            }

            if let Some(record) = self.page.pop_front() {
                self.scanned += 1;
                let similarity = self.query.fingerprint.similarity(&record.hash);
                if similarity >= self.query.min_similarity {
                    return Some(Ok(Match { record, similarity }));
                }
                continue;
            }

            if self.exhausted {
                self.close();
                return None;
            }

            if let Err(e) = self.fill_page() {
                self.close();
                return Some(Err(e));
            }
        }
    }
}
