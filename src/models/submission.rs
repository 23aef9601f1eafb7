//! Submission types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File extensions the hash engine is compiled to decode.
pub const SUPPORTED_MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Platform-assigned identifier of a submission.
///
/// Unique across all communities; the ledger is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Creates a new submission ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<String> for SubmissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A submission as returned by a community listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Unique identifier.
    pub id: SubmissionId,
    /// Community the submission was posted to.
    pub community: String,
    /// Author name, `None` when the account is gone.
    pub author: Option<String>,
    /// Submission title.
    pub title: String,
    /// Link target (the media URL for image posts).
    pub url: String,
    /// Link to the submission itself.
    pub permalink: String,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Score at listing time.
    pub score: i64,
    /// Text-only submission with no linked media.
    pub is_self: bool,
}

impl Submission {
    /// Returns the URL to fetch media from, or `None` if the submission does
    /// not link to a decodable image.
    ///
    /// Mobile imgur links are rewritten to the direct image host.
    ///
    /// # Example
    ///
    /// ```rust
    /// use reposentry::Submission;
    ///
    /// let mut submission = Submission::builder("abc", "pics");
    /// submission.url = "https://m.imgur.com/xyz.JPG".to_string();
    /// assert_eq!(submission.media_url().as_deref(), Some("https://i.imgur.com/xyz.JPG"));
    ///
    /// submission.url = "https://example.com/article".to_string();
    /// assert!(submission.media_url().is_none());
    /// ```
    #[must_use]
    pub fn media_url(&self) -> Option<String> {
        if self.is_self {
            return None;
        }

        let url = self.url.replace("m.imgur.com", "i.imgur.com");
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let extension = path.rsplit_once('.').map(|(_, ext)| ext)?;

        SUPPORTED_MEDIA_EXTENSIONS
            .contains(&extension)
            .then_some(url)
    }

    /// Creates a submission with only the identifying fields populated.
    ///
    /// The remaining fields are empty or zero; callers fill in what they need.
    #[must_use]
    pub fn builder(id: impl Into<String>, community: impl Into<String>) -> Self {
        let id = SubmissionId::new(id);
        Self {
            permalink: format!("https://redd.it/{id}"),
            id,
            community: community.into(),
            author: None,
            title: String::new(),
            url: String::new(),
            created_at: 0,
            score: 0,
            is_self: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("https://i.redd.it/abc.jpg", true; "jpg")]
    #[test_case("https://i.redd.it/abc.JPEG", true; "uppercase jpeg")]
    #[test_case("https://i.imgur.com/abc.png?1", true; "query string")]
    #[test_case("https://i.imgur.com/abc.webp#frag", true; "fragment")]
    #[test_case("https://example.com/abc.gif", true; "gif")]
    #[test_case("https://v.redd.it/abc", false; "no extension")]
    #[test_case("https://example.com/page.html", false; "html")]
    #[test_case("https://example.com/video.mp4", false; "video")]
    fn test_media_url_extension_filter(url: &str, supported: bool) {
        let mut submission = Submission::builder("abc", "pics");
        submission.url = url.to_string();
        assert_eq!(submission.media_url().is_some(), supported);
    }

    #[test]
    fn test_media_url_rewrites_mobile_imgur() {
        let mut submission = Submission::builder("abc", "pics");
        submission.url = "https://m.imgur.com/xyz.png".to_string();
        assert_eq!(
            submission.media_url().as_deref(),
            Some("https://i.imgur.com/xyz.png")
        );
    }

    #[test]
    fn test_self_posts_have_no_media() {
        let mut submission = Submission::builder("abc", "pics");
        submission.url = "https://i.redd.it/abc.jpg".to_string();
        submission.is_self = true;
        assert!(submission.media_url().is_none());
    }

    #[test]
    fn test_submission_id_roundtrip() {
        let id = SubmissionId::from("t3abc");
        assert_eq!(id.as_str(), "t3abc");
        assert_eq!(id.to_string(), "t3abc");
        assert_eq!(SubmissionId::from("t3abc".to_string()), id);
    }

    #[test]
    fn test_builder_permalink() {
        let submission = Submission::builder("abc", "pics");
        assert_eq!(submission.permalink, "https://redd.it/abc");
        assert_eq!(submission.community, "pics");
    }
}
