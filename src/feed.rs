//! Comment feed for the video currently on screen.
//!
//! The feed owns the visible thread list, the pagination cursor and the
//! per-thread "replies expanded" flags. Network work is split in two halves
//! so the server can drop its lock while a request is in flight:
//! `begin_*` hands out a [`FetchTicket`] tagged with the video and a
//! generation number, and `complete_load` applies the response only if the
//! ticket still matches. Switching videos or forcing a reload bumps the
//! generation, which turns every older ticket stale.
//!
//! The `load`, `post_comment` and `post_reply` helpers run both halves back to
//! back against a [`VideoPlatform`] for callers that can block.

use std::collections::{HashMap, HashSet};

use tokio::sync::broadcast;

use crate::client::{ClientError, ClientResult, VideoPlatform};
use crate::model::{CommentThread, CommentThreadPage, SentComment};

/// Threads requested per page.
pub const PAGE_SIZE: u32 = 20;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeedError {
    #[error("comment text must not be empty")]
    EmptyText,
    #[error("video id not provided")]
    MissingVideoId,
    #[error("comments are already loading")]
    AlreadyLoading,
    #[error(transparent)]
    Remote(#[from] ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Empty,
    Loading,
    Loaded,
    Error(String),
}

/// Change notifications for whoever renders the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    VideoChanged { video_id: Option<String> },
    LoadStarted { video_id: String },
    Loaded { count: usize, has_more: bool },
    CommentPosted { thread_id: String },
    ReplyPosted { thread_id: String },
    RepliesToggled { thread_id: String, expanded: bool },
    Failed { message: String },
}

/// Identifies one in-flight page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    video_id: String,
    generation: u64,
    cursor: Option<String>,
}

impl FetchTicket {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }
}

/// Runs the request described by `ticket`.
pub fn fetch_page(
    client: &dyn VideoPlatform,
    ticket: &FetchTicket,
) -> ClientResult<CommentThreadPage> {
    client.list_comments(&ticket.video_id, PAGE_SIZE, ticket.cursor())
}

pub struct CommentFeed {
    video_id: Option<String>,
    generation: u64,
    threads: Vec<CommentThread>,
    cursor: Option<String>,
    expanded: HashMap<String, bool>,
    status: FeedStatus,
    events: broadcast::Sender<FeedEvent>,
}

impl CommentFeed {
    pub fn new(video_id: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            video_id: video_id.filter(|id| !id.trim().is_empty()),
            generation: 0,
            threads: Vec::new(),
            cursor: None,
            expanded: HashMap::new(),
            status: FeedStatus::Empty,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: FeedEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn threads(&self) -> &[CommentThread] {
        &self.threads
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    pub fn is_loading(&self) -> bool {
        self.status == FeedStatus::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            FeedStatus::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_expanded(&self, thread_id: &str) -> bool {
        self.expanded.get(thread_id).copied().unwrap_or(false)
    }

    pub fn expanded(&self) -> &HashMap<String, bool> {
        &self.expanded
    }

    /// Points the feed at another video. Everything tied to the old one is
    /// dropped and its in-flight requests become stale.
    pub fn set_video(&mut self, video_id: Option<String>) {
        let video_id = video_id.filter(|id| !id.trim().is_empty());
        if video_id == self.video_id {
            return;
        }
        self.generation += 1;
        self.video_id = video_id;
        self.threads.clear();
        self.cursor = None;
        self.expanded.clear();
        self.status = FeedStatus::Empty;
        tracing::debug!(video_id = ?self.video_id, "comment feed switched video");
        self.emit(FeedEvent::VideoChanged {
            video_id: self.video_id.clone(),
        });
    }

    /// Starts loading the page after the current cursor (the first page when
    /// there is none). Returns `None` when no video is set.
    pub fn begin_load(&mut self) -> Result<Option<FetchTicket>, FeedError> {
        if self.is_loading() {
            return Err(FeedError::AlreadyLoading);
        }
        Ok(self.issue_ticket())
    }

    /// Starts a reload from the first page. Any request already in flight is
    /// superseded rather than waited for.
    pub fn begin_reload(&mut self) -> Option<FetchTicket> {
        self.cursor = None;
        if self.is_loading() {
            self.generation += 1;
        }
        self.issue_ticket()
    }

    fn issue_ticket(&mut self) -> Option<FetchTicket> {
        let video_id = self.video_id.clone()?;
        self.status = FeedStatus::Loading;
        self.emit(FeedEvent::LoadStarted {
            video_id: video_id.clone(),
        });
        Some(FetchTicket {
            video_id,
            generation: self.generation,
            cursor: self.cursor.clone(),
        })
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation && self.video_id.as_deref() == Some(ticket.video_id.as_str())
    }

    /// Applies a page response. Returns `false` when the ticket was stale and
    /// the response was dropped.
    pub fn complete_load(
        &mut self,
        ticket: &FetchTicket,
        result: ClientResult<CommentThreadPage>,
    ) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(video_id = %ticket.video_id, "ignoring stale comment page");
            return false;
        }
        match result {
            Ok(page) => {
                let threads = std::mem::take(&mut self.threads);
                self.threads = if ticket.cursor.is_none() {
                    merge_threads(Vec::new(), page.items)
                } else {
                    merge_threads(threads, page.items)
                };
                self.cursor = page.next_page_token;
                self.status = FeedStatus::Loaded;
                tracing::debug!(
                    video_id = %ticket.video_id,
                    threads = self.threads.len(),
                    has_more = self.has_more(),
                    "comment page applied"
                );
                self.emit(FeedEvent::Loaded {
                    count: self.threads.len(),
                    has_more: self.has_more(),
                });
            }
            Err(err) => self.fail(err.to_string()),
        }
        true
    }

    /// Gives up on a request that will never complete, e.g. because the
    /// task running it was cancelled. A still-current ticket moves the feed
    /// to an error so the next load can start; stale tickets are ignored.
    pub fn abandon(&mut self, ticket: &FetchTicket) -> bool {
        if !self.is_current(ticket) || !self.is_loading() {
            return false;
        }
        self.fail("loading comments was interrupted".to_string());
        true
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(video_id = ?self.video_id, error = %message, "comment request failed");
        self.status = FeedStatus::Error(message.clone());
        self.emit(FeedEvent::Failed { message });
    }

    /// Checks the text of a new comment or reply and returns the video it
    /// belongs to. Nothing here touches the network.
    pub fn prepare_post(&self, text: &str) -> Result<String, FeedError> {
        let video_id = self.video_id.clone().ok_or(FeedError::MissingVideoId)?;
        if text.trim().is_empty() {
            return Err(FeedError::EmptyText);
        }
        Ok(video_id)
    }

    /// Applies the outcome of posting a comment to `video_id`. On success the
    /// new thread goes first and the cursor is reset; the caller follows up
    /// with a reload.
    pub fn finish_comment(
        &mut self,
        video_id: &str,
        result: ClientResult<SentComment>,
    ) -> Result<(), FeedError> {
        if self.video_id.as_deref() != Some(video_id) {
            return Ok(());
        }
        match result {
            Ok(sent) => {
                let thread_id = sent.comment.id.clone();
                let existing = std::mem::take(&mut self.threads);
                self.threads = merge_threads(vec![sent.comment], existing);
                self.cursor = None;
                self.emit(FeedEvent::CommentPosted { thread_id });
                Ok(())
            }
            Err(err) => {
                self.fail(err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn finish_reply(
        &mut self,
        video_id: &str,
        thread_id: &str,
        result: ClientResult<()>,
    ) -> Result<(), FeedError> {
        if self.video_id.as_deref() != Some(video_id) {
            return Ok(());
        }
        match result {
            Ok(()) => {
                self.expanded.insert(thread_id.to_string(), true);
                self.cursor = None;
                self.emit(FeedEvent::ReplyPosted {
                    thread_id: thread_id.to_string(),
                });
                Ok(())
            }
            Err(err) => {
                self.fail(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Flips the expansion flag of one thread and returns the new value.
    pub fn toggle_replies(&mut self, thread_id: &str) -> bool {
        let flag = self.expanded.entry(thread_id.to_string()).or_insert(false);
        *flag = !*flag;
        let expanded = *flag;
        self.emit(FeedEvent::RepliesToggled {
            thread_id: thread_id.to_string(),
            expanded,
        });
        expanded
    }

    /// Loads the next page (or the first one) synchronously.
    pub fn load(&mut self, client: &dyn VideoPlatform) -> Result<(), FeedError> {
        let Some(ticket) = self.begin_load()? else {
            return Ok(());
        };
        self.run(client, ticket)
    }

    pub fn reload(&mut self, client: &dyn VideoPlatform) -> Result<(), FeedError> {
        match self.begin_reload() {
            Some(ticket) => self.run(client, ticket),
            None => Ok(()),
        }
    }

    fn run(&mut self, client: &dyn VideoPlatform, ticket: FetchTicket) -> Result<(), FeedError> {
        let result = fetch_page(client, &ticket);
        let failure = result.as_ref().err().cloned();
        self.complete_load(&ticket, result);
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Posts a top-level comment, then reloads from the first page. A failed
    /// reload leaves the optimistic insert in place and the feed in the
    /// error state; the post itself still counts as done.
    pub fn post_comment(&mut self, client: &dyn VideoPlatform, text: &str) -> Result<(), FeedError> {
        let video_id = self.prepare_post(text)?;
        let result = client.send_comment(&video_id, text);
        self.finish_comment(&video_id, result)?;
        let _ = self.reload(client);
        Ok(())
    }

    pub fn post_reply(
        &mut self,
        client: &dyn VideoPlatform,
        thread_id: &str,
        text: &str,
    ) -> Result<(), FeedError> {
        let video_id = self.prepare_post(text)?;
        let result = client.reply_comment(thread_id, text);
        self.finish_reply(&video_id, thread_id, result)?;
        let _ = self.reload(client);
        Ok(())
    }
}

/// Appends `incoming` after `existing`, keeping the first thread seen for each
/// id.
pub fn merge_threads(existing: Vec<CommentThread>, incoming: Vec<CommentThread>) -> Vec<CommentThread> {
    let mut seen = HashSet::new();
    existing
        .into_iter()
        .chain(incoming)
        .filter(|thread| seen.insert(thread.id.clone()))
        .collect()
}
