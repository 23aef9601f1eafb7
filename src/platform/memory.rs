//! Scriptable in-memory platform.
//!
//! Serves listings, media, live state, and inbox messages from maps populated
//! by the caller, and records every moderation action so tests can assert on
//! them. Listings are stored as sequences of `Result`s, which lets a script
//! inject an error at any position.

use super::{
    Comment, CommentId, InboxMessage, Listing, MessageId, PlatformClient, PlatformError,
    PlatformResult, TimeWindow,
};
use crate::models::{LiveState, Submission, SubmissionId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

type ScriptedListing = Vec<PlatformResult<Submission>>;

#[derive(Debug, Default)]
struct State {
    top: HashMap<(String, TimeWindow), ScriptedListing>,
    new: HashMap<String, ScriptedListing>,
    media: HashMap<String, PlatformResult<Vec<u8>>>,
    fetches: HashMap<String, usize>,
    live: HashMap<SubmissionId, PlatformResult<Option<LiveState>>>,
    inbox: Vec<InboxMessage>,
    inbox_error: Option<PlatformError>,
    moderators: HashSet<(String, String)>,
    config_pages: HashMap<String, String>,
    config_page_error: Option<PlatformError>,
    report_error: Option<PlatformError>,
    reply_error: Option<PlatformError>,
    removal_error: Option<PlatformError>,
    next_comment: usize,

    reports: Vec<(SubmissionId, String)>,
    replies: Vec<Comment>,
    removed_comments: Vec<CommentId>,
    distinguished: Vec<(CommentId, bool)>,
    removed_submissions: Vec<(SubmissionId, String)>,
    message_replies: Vec<(MessageId, String)>,
    read: Vec<MessageId>,
    accepted_invites: Vec<String>,
}

/// A [`PlatformClient`] backed by in-memory maps.
#[derive(Debug, Default)]
pub struct InMemoryPlatform {
    state: Mutex<State>,
}

impl InMemoryPlatform {
    /// Creates an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Scripting

    /// Sets the top listing of a community for a window.
    pub fn set_top(&self, community: &str, window: TimeWindow, submissions: Vec<Submission>) {
        self.state().top.insert(
            (community.to_string(), window),
            submissions.into_iter().map(Ok).collect(),
        );
    }

    /// Appends an error to the end of a top listing.
    pub fn push_top_error(&self, community: &str, window: TimeWindow, error: PlatformError) {
        self.state()
            .top
            .entry((community.to_string(), window))
            .or_default()
            .push(Err(error));
    }

    /// Sets the newest-submissions listing of a community.
    pub fn set_new(&self, community: &str, submissions: Vec<Submission>) {
        self.state().new.insert(
            community.to_string(),
            submissions.into_iter().map(Ok).collect(),
        );
    }

    /// Appends an error to the end of a newest-submissions listing.
    pub fn push_new_error(&self, community: &str, error: PlatformError) {
        self.state()
            .new
            .entry(community.to_string())
            .or_default()
            .push(Err(error));
    }

    /// Serves `bytes` for `url`.
    pub fn add_media(&self, url: &str, bytes: Vec<u8>) {
        self.state().media.insert(url.to_string(), Ok(bytes));
    }

    /// Fails fetches of `url` with `error`.
    pub fn fail_media(&self, url: &str, error: PlatformError) {
        self.state().media.insert(url.to_string(), Err(error));
    }

    /// Sets the live state returned for a submission.
    pub fn set_live_state(&self, id: impl Into<SubmissionId>, state: LiveState) {
        self.state().live.insert(id.into(), Ok(Some(state)));
    }

    /// Fails live-state lookups for a submission.
    pub fn fail_live_state(&self, id: impl Into<SubmissionId>, error: PlatformError) {
        self.state().live.insert(id.into(), Err(error));
    }

    /// Queues an unread inbox message.
    pub fn push_message(&self, message: InboxMessage) {
        self.state().inbox.push(message);
    }

    /// Fails the next inbox read.
    pub fn fail_inbox(&self, error: PlatformError) {
        self.state().inbox_error = Some(error);
    }

    /// Registers `user` as a moderator of `community`.
    pub fn add_moderator(&self, user: &str, community: &str) {
        self.state()
            .moderators
            .insert((user.to_string(), community.to_string()));
    }

    /// Sets a community's configuration page.
    pub fn set_config_page(&self, community: &str, text: &str) {
        self.state()
            .config_pages
            .insert(community.to_string(), text.to_string());
    }

    /// Fails configuration page reads and writes.
    pub fn fail_config_pages(&self, error: PlatformError) {
        self.state().config_page_error = Some(error);
    }

    /// Fails every report.
    pub fn fail_reports(&self, error: PlatformError) {
        self.state().report_error = Some(error);
    }

    /// Fails every reply to a submission.
    pub fn fail_replies(&self, error: PlatformError) {
        self.state().reply_error = Some(error);
    }

    /// Fails every comment and submission removal.
    pub fn fail_removals(&self, error: PlatformError) {
        self.state().removal_error = Some(error);
    }

    // Inspection

    /// Reports filed, in order.
    #[must_use]
    pub fn reports(&self) -> Vec<(SubmissionId, String)> {
        self.state().reports.clone()
    }

    /// Replies posted to submissions, in order.
    #[must_use]
    pub fn replies(&self) -> Vec<Comment> {
        self.state().replies.clone()
    }

    /// Comments removed, in order.
    #[must_use]
    pub fn removed_comments(&self) -> Vec<CommentId> {
        self.state().removed_comments.clone()
    }

    /// Comments distinguished, with their sticky flag.
    #[must_use]
    pub fn distinguished(&self) -> Vec<(CommentId, bool)> {
        self.state().distinguished.clone()
    }

    /// Submissions removed, with the removal reason.
    #[must_use]
    pub fn removed_submissions(&self) -> Vec<(SubmissionId, String)> {
        self.state().removed_submissions.clone()
    }

    /// Replies sent to inbox messages.
    #[must_use]
    pub fn message_replies(&self) -> Vec<(MessageId, String)> {
        self.state().message_replies.clone()
    }

    /// Messages marked read.
    #[must_use]
    pub fn read_messages(&self) -> Vec<MessageId> {
        self.state().read.clone()
    }

    /// Communities whose invite was accepted.
    #[must_use]
    pub fn accepted_invites(&self) -> Vec<String> {
        self.state().accepted_invites.clone()
    }

    /// Current configuration page of a community.
    #[must_use]
    pub fn config_page(&self, community: &str) -> Option<String> {
        self.state().config_pages.get(community).cloned()
    }

    /// Number of fetch attempts for `url`.
    #[must_use]
    pub fn fetch_count(&self, url: &str) -> usize {
        self.state().fetches.get(url).copied().unwrap_or(0)
    }

    /// Total number of moderation actions taken (reports, replies, removals).
    #[must_use]
    pub fn action_count(&self) -> usize {
        let state = self.state();
        state.reports.len()
            + state.replies.len()
            + state.removed_comments.len()
            + state.removed_submissions.len()
    }
}

fn check(error: Option<&PlatformError>) -> PlatformResult<()> {
    error.map_or(Ok(()), |e| Err(e.clone()))
}

impl PlatformClient for InMemoryPlatform {
    fn list_top(&self, community: &str, window: TimeWindow) -> PlatformResult<Listing<'_>> {
        let items = self
            .state()
            .top
            .get(&(community.to_string(), window))
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(items.into_iter()))
    }

    fn list_new(&self, community: &str) -> PlatformResult<Listing<'_>> {
        let items = self.state().new.get(community).cloned().unwrap_or_default();
        Ok(Box::new(items.into_iter()))
    }

    fn fetch_bytes(&self, url: &str) -> PlatformResult<Vec<u8>> {
        let mut state = self.state();
        *state.fetches.entry(url.to_string()).or_default() += 1;
        state
            .media
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(PlatformError::NotFound(url.to_string())))
    }

    fn report(&self, submission: &SubmissionId, reason: &str) -> PlatformResult<()> {
        let mut state = self.state();
        check(state.report_error.as_ref())?;
        state.reports.push((submission.clone(), reason.to_string()));
        Ok(())
    }

    fn reply(&self, submission: &SubmissionId, text: &str) -> PlatformResult<Comment> {
        let mut state = self.state();
        check(state.reply_error.as_ref())?;
        state.next_comment += 1;
        let comment = Comment {
            id: CommentId::new(format!("c{}", state.next_comment)),
            parent: submission.clone(),
            body: text.to_string(),
        };
        state.replies.push(comment.clone());
        Ok(comment)
    }

    fn remove_comment(&self, comment: &CommentId) -> PlatformResult<()> {
        let mut state = self.state();
        check(state.removal_error.as_ref())?;
        state.removed_comments.push(comment.clone());
        Ok(())
    }

    fn distinguish_comment(&self, comment: &CommentId, sticky: bool) -> PlatformResult<()> {
        self.state().distinguished.push((comment.clone(), sticky));
        Ok(())
    }

    fn remove_submission(&self, submission: &SubmissionId, reason: &str) -> PlatformResult<()> {
        let mut state = self.state();
        check(state.removal_error.as_ref())?;
        state
            .removed_submissions
            .push((submission.clone(), reason.to_string()));
        Ok(())
    }

    fn get_current_state(&self, submission: &SubmissionId) -> PlatformResult<Option<LiveState>> {
        self.state().live.get(submission).cloned().unwrap_or(Ok(None))
    }

    fn unread_messages(&self) -> PlatformResult<Vec<InboxMessage>> {
        let mut state = self.state();
        if let Some(error) = state.inbox_error.take() {
            return Err(error);
        }
        let read: HashSet<_> = state.read.iter().cloned().collect();
        Ok(state
            .inbox
            .iter()
            .filter(|m| !read.contains(&m.id))
            .cloned()
            .collect())
    }

    fn mark_read(&self, message: &MessageId) -> PlatformResult<()> {
        self.state().read.push(message.clone());
        Ok(())
    }

    fn reply_to_message(&self, message: &MessageId, text: &str) -> PlatformResult<()> {
        self.state()
            .message_replies
            .push((message.clone(), text.to_string()));
        Ok(())
    }

    fn accept_invite(&self, community: &str) -> PlatformResult<()> {
        self.state().accepted_invites.push(community.to_string());
        Ok(())
    }

    fn is_moderator(&self, user: &str, community: &str) -> PlatformResult<bool> {
        Ok(self
            .state()
            .moderators
            .contains(&(user.to_string(), community.to_string())))
    }

    fn fetch_config_page(&self, community: &str) -> PlatformResult<Option<String>> {
        let state = self.state();
        check(state.config_page_error.as_ref())?;
        Ok(state.config_pages.get(community).cloned())
    }

    fn write_config_page(&self, community: &str, text: &str) -> PlatformResult<()> {
        let mut state = self.state();
        check(state.config_page_error.as_ref())?;
        state
            .config_pages
            .insert(community.to_string(), text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_yields_scripted_error_last() {
        let platform = InMemoryPlatform::new();
        platform.set_top("pics", TimeWindow::All, vec![Submission::builder("a", "pics")]);
        platform.push_top_error("pics", TimeWindow::All, PlatformError::ServerError("503".into()));

        let items: Vec<_> = platform.list_top("pics", TimeWindow::All).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(PlatformError::ServerError(_))));
    }

    #[test]
    fn test_unknown_media_is_not_found_and_counted() {
        let platform = InMemoryPlatform::new();
        assert!(matches!(
            platform.fetch_bytes("https://i.redd.it/x.png"),
            Err(PlatformError::NotFound(_))
        ));
        assert_eq!(platform.fetch_count("https://i.redd.it/x.png"), 1);
    }

    #[test]
    fn test_read_messages_are_not_returned_again() {
        let platform = InMemoryPlatform::new();
        platform.push_message(InboxMessage::direct("m1", "alice", "r/pics", "update"));
        let unread = platform.unread_messages().unwrap();
        assert_eq!(unread.len(), 1);
        platform.mark_read(&unread[0].id).unwrap();
        assert!(platform.unread_messages().unwrap().is_empty());
    }

    #[test]
    fn test_replies_get_distinct_ids() {
        let platform = InMemoryPlatform::new();
        let id = SubmissionId::new("abc");
        let first = platform.reply(&id, "one").unwrap();
        let second = platform.reply(&id, "two").unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(platform.replies().len(), 2);
    }

    #[test]
    fn test_scripted_failures() {
        let platform = InMemoryPlatform::new();
        platform.fail_reports(PlatformError::Forbidden("report".into()));
        assert!(platform.report(&SubmissionId::new("a"), "r").is_err());
        assert!(platform.reports().is_empty());
        assert_eq!(platform.action_count(), 0);
    }
}
