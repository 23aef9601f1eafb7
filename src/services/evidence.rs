//! Evidence tables shown in reports and mention replies.

use crate::Result;
use crate::models::{LiveState, LiveStatus, Match, SubmissionId};
use crate::platform::{PlatformClient, PlatformError};
use chrono::DateTime;

const DELETED: &str = "[deleted]";

/// One resolved row of an evidence table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceRow {
    /// Author of the earlier submission, `None` once deleted.
    pub author: Option<String>,
    /// Creation time of the earlier submission (Unix epoch seconds).
    pub posted_at: i64,
    /// Link target.
    pub url: String,
    /// Title.
    pub title: String,
    /// Link to the submission.
    pub permalink: String,
    /// Current score.
    pub score: i64,
    /// Current status.
    pub status: LiveStatus,
    /// Similarity to the query, in percent.
    pub similarity: u8,
}

impl EvidenceRow {
    /// Builds a row from a match and the platform's view of the original.
    ///
    /// Without a live state the original is treated as deleted.
    #[must_use]
    pub fn new(m: &Match, live: Option<&LiveState>) -> Self {
        live.map_or_else(
            || Self {
                author: None,
                posted_at: m.record.created_at,
                url: fallback_link(&m.record.submission_id),
                title: DELETED.to_string(),
                permalink: fallback_link(&m.record.submission_id),
                score: 0,
                status: LiveStatus::Deleted,
                similarity: m.similarity,
            },
            |state| Self {
                author: state.author.clone(),
                posted_at: m.record.created_at,
                url: state.url.clone(),
                title: state.title.clone(),
                permalink: state.permalink.clone(),
                score: state.score,
                status: state.status(),
                similarity: m.similarity,
            },
        )
    }

    /// Renders the row as a table line, newline included.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "/u/{} | {} | [URL]({}) | [{}]({}) | {} | {} | {}%\n",
            self.author.as_deref().unwrap_or(DELETED),
            format_timestamp(self.posted_at),
            self.url,
            escape_cell(&self.title),
            self.permalink,
            self.score,
            self.status,
            self.similarity,
        )
    }
}

fn fallback_link(id: &SubmissionId) -> String {
    format!("https://redd.it/{id}")
}

/// Table cells are pipe-delimited; a pipe in a title would split the row.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Formats a timestamp as `Www, Mmm DD, YYYY at HH:MM:SS UTC`.
#[must_use]
pub fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0).map_or_else(
        || secs.to_string(),
        |dt| dt.format("%a, %b %d, %Y at %H:%M:%S UTC").to_string(),
    )
}

/// Looks up the current state of every matched original.
///
/// A missing or not-found original becomes a deleted row. Any other
/// recoverable error drops that row.
///
/// # Errors
///
/// Returns the first fatal platform error.
pub fn resolve_rows<'m, P, I>(client: &P, matches: I) -> Result<Vec<EvidenceRow>>
where
    P: PlatformClient + ?Sized,
    I: IntoIterator<Item = &'m Match>,
{
    let mut rows = Vec::new();
    for m in matches {
        match client.get_current_state(&m.record.submission_id) {
            Ok(live) => rows.push(EvidenceRow::new(m, live.as_ref())),
            Err(PlatformError::NotFound(_)) => rows.push(EvidenceRow::new(m, None)),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    submission_id = %m.record.submission_id,
                    error = %e,
                    "Could not resolve matched submission, leaving it out"
                );
            },
        }
    }
    Ok(rows)
}

/// Rendered rows that fit in a size budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedTable {
    /// The concatenated rows.
    pub rows: String,
    /// Number of rows included.
    pub included: usize,
    /// Number of rows left out for size.
    pub truncated: usize,
}

/// Appends rendered rows until the next one would push `overhead + rows`
/// past `budget`.
#[must_use]
pub fn render_rows(rows: &[EvidenceRow], overhead: usize, budget: usize) -> RenderedTable {
    let mut table = RenderedTable::default();
    for (i, row) in rows.iter().enumerate() {
        let line = row.render();
        if overhead + table.rows.len() + line.len() > budget {
            table.truncated = rows.len() - i;
            break;
        }
        table.rows.push_str(&line);
        table.included += 1;
    }
    table
}
