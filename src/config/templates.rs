//! Reply templates.

use serde::{Deserialize, Serialize};

/// Placeholder replaced with the rendered evidence rows.
pub const ROWS_PLACEHOLDER: &str = "{rows}";

const TABLE_HEADER: &str = "Author | Posted | Link | Title | Score | Status | Similarity\n\
                            :--|:--|:--|:--|:--|:--|:--\n";

/// Text of every reply the bot posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Evidence reply on a detected repost. `{rows}` receives the table rows.
    pub info_auto: String,
    /// Reply to a username mention with matches. `{rows}` receives the rows.
    pub info_mentioned: String,
    /// Reply to a mention on a submission that has not been indexed.
    pub mention_no_data: String,
    /// Reply to a mention on an indexed submission with no matches.
    pub mention_no_matches: String,
    /// Reply posted when a repost is removed automatically.
    pub autoremove_message: String,
    /// Footer appended to every reply on a submission.
    pub bot_notice: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            info_auto: format!(
                "**Possible repost.** These earlier posts in this community look \
                 similar:\n\n{TABLE_HEADER}{ROWS_PLACEHOLDER}"
            ),
            info_mentioned: format!(
                "Here are the posts in this community that look similar to this \
                 one:\n\n{TABLE_HEADER}{ROWS_PLACEHOLDER}"
            ),
            mention_no_data: "I haven't indexed this post yet, so I have no data to \
                              compare it against."
                .to_string(),
            mention_no_matches: "I searched this community and found no posts similar \
                                 to this one."
                .to_string(),
            autoremove_message: "This post has been removed because it closely matches \
                                 an image already posted to this community."
                .to_string(),
            bot_notice: "\n\n---\n\n*I am a bot. Please contact the moderators of this \
                         community with any questions.*"
                .to_string(),
        }
    }
}

impl TemplatesConfig {
    /// Renders `template` with `rows` and appends the bot notice.
    #[must_use]
    pub fn render(&self, template: &str, rows: &str) -> String {
        let mut body = template.replace(ROWS_PLACEHOLDER, rows);
        body.push_str(&self.bot_notice);
        body
    }

    /// Size of `template` once rendered with no rows.
    #[must_use]
    pub fn overhead(&self, template: &str) -> usize {
        template.len() - template.matches(ROWS_PLACEHOLDER).count() * ROWS_PLACEHOLDER.len()
            + self.bot_notice.len()
    }
}
