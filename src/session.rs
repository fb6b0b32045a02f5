//! Event-loop owner of the feed state.
//!
//! [`FeedSession`] holds the [`FeedStore`] together with the controllers
//! that mutate it and is the only place where request results are applied.
//! UI code calls the action methods, then feeds completions back with
//! [`FeedSession::next_event`] and [`FeedSession::handle_event`] (or
//! [`FeedSession::settle`] to drain everything outstanding).

use crate::api::{ApiError, FeedApi};
use crate::config::Config;
use crate::media::{DoubleTapPolicy, TapAction, TapDisambiguator, DOUBLE_TAP_WINDOW};
use crate::store::{Comment, CommentId, CommentThread, FeedStore, Post, PostId, UserId, Viewer};
use crate::sync::{
    spawn_request, Dispatch, IgnoreReason, MutationCoordinator, Operation, PageOutcome, Paginator,
    SyncError, SyncEvent, EVENT_CHANNEL_CAPACITY,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How long a notice stays up before it expires on its own.
pub const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub page_size: usize,
    pub double_tap_window: Duration,
    pub double_tap_policy: DoubleTapPolicy,
    pub user_id: Option<UserId>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            page_size: 20,
            double_tap_window: DOUBLE_TAP_WINDOW,
            double_tap_policy: DoubleTapPolicy::default(),
            user_id: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            double_tap_window: config.double_tap_window(),
            double_tap_policy: config.double_tap_policy,
            user_id: config
                .user_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(UserId::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// Dismissible one-line message for the user.
#[derive(Debug, Clone)]
pub struct Notice {
    pub text: String,
    pub kind: NoticeKind,
    shown_at: Instant,
}

/// Result of a tap on a media surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// Double tap; carries what happened to the like request.
    Like(Dispatch),
    /// A single tap completed; the caller toggles mute on the item.
    ToggleMute,
}

pub struct FeedSession {
    store: FeedStore,
    paginator: Paginator,
    coordinator: MutationCoordinator,
    viewer: Viewer,
    api: Arc<dyn FeedApi>,
    tx: mpsc::Sender<SyncEvent>,
    events: mpsc::Receiver<SyncEvent>,
    loading_comments: HashSet<PostId>,
    taps: HashMap<PostId, TapDisambiguator>,
    tap_window: Duration,
    tap_policy: DoubleTapPolicy,
    notice: Option<Notice>,
}

impl FeedSession {
    pub fn new(api: Arc<dyn FeedApi>, options: SessionOptions) -> Self {
        let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: FeedStore::new(),
            paginator: Paginator::new(Arc::clone(&api), tx.clone(), options.page_size),
            coordinator: MutationCoordinator::new(Arc::clone(&api), tx.clone()),
            viewer: Viewer::new(options.user_id),
            api,
            tx,
            events,
            loading_comments: HashSet::new(),
            taps: HashMap::new(),
            tap_window: options.double_tap_window,
            tap_policy: options.double_tap_policy,
            notice: None,
        }
    }

    // ------------------------------------------------------------------------
    // Read API
    // ------------------------------------------------------------------------

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.store.get(id)
    }

    pub fn thread(&self, post_id: &PostId) -> Option<&CommentThread> {
        self.store.thread(post_id)
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Whether to offer a delete control. A UI hint only; the backend
    /// decides whether the delete is allowed.
    pub fn can_delete(&self, comment: &Comment) -> bool {
        self.viewer.can_delete(comment)
    }

    pub fn owns_post(&self, post: &Post) -> bool {
        self.viewer.owns_post(post)
    }

    pub fn has_more(&self) -> bool {
        self.paginator.has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.paginator.is_loading()
    }

    pub fn is_paging_halted(&self) -> bool {
        self.paginator.is_halted()
    }

    pub fn is_like_pending(&self, post_id: &PostId) -> bool {
        self.coordinator.is_like_pending(post_id)
    }

    /// Any request still waiting for its result.
    pub fn has_pending(&self) -> bool {
        self.paginator.is_loading()
            || self.coordinator.has_pending()
            || !self.loading_comments.is_empty()
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    pub fn refresh(&mut self) -> Dispatch {
        self.paginator.refresh()
    }

    pub fn load_more(&mut self) -> Dispatch {
        self.paginator.load_more()
    }

    pub fn toggle_like(&mut self, post_id: &PostId) -> Dispatch {
        self.coordinator.toggle_like(&mut self.store, post_id)
    }

    pub fn add_comment(
        &mut self,
        post_id: &PostId,
        text: &str,
        parent_id: Option<CommentId>,
    ) -> Dispatch {
        self.coordinator.add_comment(&self.store, post_id, text, parent_id)
    }

    /// Reply to the comment selected with [`select_reply_target`](Self::select_reply_target),
    /// or post top-level when none is selected.
    pub fn reply(&mut self, post_id: &PostId, text: &str) -> Dispatch {
        let parent = self
            .store
            .thread(post_id)
            .and_then(|t| t.reply_target().cloned());
        self.add_comment(post_id, text, parent)
    }

    pub fn delete_comment(&mut self, post_id: &PostId, comment_id: &CommentId) -> Dispatch {
        self.coordinator.delete_comment(post_id, comment_id)
    }

    pub fn report(&mut self, post_id: &PostId, reason: &str) -> Dispatch {
        self.coordinator.report(post_id, reason)
    }

    /// Fetch the comment thread of a post. One fetch per post at a time.
    pub fn load_comments(&mut self, post_id: &PostId) -> Dispatch {
        if !self.store.contains(post_id) {
            return Dispatch::Ignored(IgnoreReason::UnknownPost);
        }
        if !self.loading_comments.insert(post_id.clone()) {
            return Dispatch::Ignored(IgnoreReason::AlreadyPending);
        }

        let api = Arc::clone(&self.api);
        let request_id = post_id.clone();
        let event_id = post_id.clone();
        spawn_request(
            &self.tx,
            "fetch_comments",
            async move { api.fetch_comments(&request_id).await },
            move |result| SyncEvent::CommentsLoaded {
                post_id: event_id,
                result,
            },
        );
        Dispatch::Sent
    }

    pub fn select_reply_target(&mut self, post_id: &PostId, comment_id: &CommentId) -> bool {
        self.store
            .thread_mut(post_id)
            .is_some_and(|t| t.select_reply_target(comment_id))
    }

    pub fn clear_reply_target(&mut self, post_id: &PostId) {
        if let Some(thread) = self.store.thread_mut(post_id) {
            thread.clear_reply_target();
        }
    }

    // ------------------------------------------------------------------------
    // Gestures
    // ------------------------------------------------------------------------

    /// Register a tap on a post's media. `None` while the tap may still
    /// become a double tap.
    pub fn tap_media(&mut self, post_id: &PostId, now: Instant) -> Option<TapOutcome> {
        let window = self.tap_window;
        let action = self
            .taps
            .entry(post_id.clone())
            .or_insert_with(|| TapDisambiguator::new(window))
            .on_tap(now)?;

        match action {
            TapAction::ToggleMute => Some(TapOutcome::ToggleMute),
            TapAction::Like => {
                let liked = self
                    .store
                    .get(post_id)
                    .is_some_and(|p| p.user_has_liked);
                if !self.tap_policy.sends_toggle(liked) {
                    tracing::debug!(post_id = %post_id, "Double tap on liked post ignored");
                    return Some(TapOutcome::Like(Dispatch::Ignored(
                        IgnoreReason::AlreadyLiked,
                    )));
                }
                Some(TapOutcome::Like(self.toggle_like(post_id)))
            }
        }
    }

    /// Periodic tick: fire single taps whose window has passed and expire
    /// the notice. Returns the posts whose mute should toggle; map each to
    /// its list index with [`FeedStore::position`] and pass that to
    /// [`PlaybackDeck::toggle_mute`](crate::media::PlaybackDeck::toggle_mute).
    pub fn tick(&mut self, now: Instant) -> Vec<PostId> {
        self.clear_expired_notice(now);

        let mut fired = Vec::new();
        for (post_id, taps) in &mut self.taps {
            if let Some(TapAction::ToggleMute) = taps.poll(now) {
                fired.push(post_id.clone());
            }
        }
        self.taps.retain(|_, taps| taps.is_pending());
        fired
    }

    // ------------------------------------------------------------------------
    // Notices
    // ------------------------------------------------------------------------

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    fn set_notice(&mut self, text: impl Into<String>, kind: NoticeKind, now: Instant) {
        self.notice = Some(Notice {
            text: text.into(),
            kind,
            shown_at: now,
        });
    }

    /// Clear the notice once it is older than [`NOTICE_TTL`].
    /// Returns true if a notice was actually cleared.
    pub fn clear_expired_notice(&mut self, now: Instant) -> bool {
        if let Some(notice) = &self.notice {
            if now.saturating_duration_since(notice.shown_at) >= NOTICE_TTL {
                self.notice = None;
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Wait for the next request completion.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// Apply a completion to the store. A failure is also posted as an
    /// error notice.
    ///
    /// Completions arrive from the runtime rather than from a UI frame, so
    /// notices are stamped with the tokio clock at the moment of applying.
    /// Use [`handle_event_at`](Self::handle_event_at) to supply the frame time.
    pub fn handle_event(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        self.handle_event_at(event, Instant::now())
    }

    /// [`handle_event`](Self::handle_event) with an explicit notice timestamp.
    pub fn handle_event_at(&mut self, event: SyncEvent, now: Instant) -> Result<(), SyncError> {
        let result = self.apply_event(event, now);
        if let Err(e) = &result {
            self.set_notice(e.to_string(), NoticeKind::Error, now);
        }
        result
    }

    fn apply_event(&mut self, event: SyncEvent, now: Instant) -> Result<(), SyncError> {
        match event {
            SyncEvent::PageLoaded {
                generation,
                mode,
                result,
            } => match self
                .paginator
                .on_page_loaded(&mut self.store, generation, mode, result)
            {
                PageOutcome::Applied { .. } => {
                    let store = &self.store;
                    self.taps.retain(|id, _| store.contains(id));
                    Ok(())
                }
                PageOutcome::Stale => Ok(()),
                PageOutcome::Failed(e) => Err(e),
            },
            SyncEvent::CommentsLoaded { post_id, result } => {
                self.on_comments_loaded(&post_id, result)
            }
            SyncEvent::LikeSettled { post_id, result } => self
                .coordinator
                .on_like_settled(&mut self.store, &post_id, result)
                .map_or(Ok(()), |settled| settled.map(|_| ())),
            SyncEvent::CommentAdded { post_id, result } => self
                .coordinator
                .on_comment_added(&mut self.store, &post_id, result)
                .map(|_| ()),
            SyncEvent::CommentDeleted {
                post_id,
                comment_id,
                result,
            } => self
                .coordinator
                .on_comment_deleted(&mut self.store, &post_id, &comment_id, result)
                .unwrap_or(Ok(())),
            SyncEvent::Reported { post_id, result } => {
                self.coordinator.on_reported(&post_id, result)?;
                self.set_notice("Report submitted", NoticeKind::Info, now);
                Ok(())
            }
        }
    }

    fn on_comments_loaded(
        &mut self,
        post_id: &PostId,
        result: Result<Vec<Comment>, ApiError>,
    ) -> Result<(), SyncError> {
        self.loading_comments.remove(post_id);
        let comments = match result {
            Ok(comments) => comments,
            Err(e) => {
                tracing::warn!(post_id = %post_id, error = %e, "Comment fetch failed");
                return Err(SyncError::from_api(Operation::LoadComments, &e));
            }
        };

        let previous_target = self
            .store
            .thread(post_id)
            .and_then(|t| t.reply_target().cloned());
        let mut thread = CommentThread::from_fetched(post_id.clone(), comments);
        if let Some(target) = previous_target {
            thread.select_reply_target(&target);
        }
        let count = thread.len();
        if self.store.replace_thread(thread) {
            tracing::info!(post_id = %post_id, count, "Comments loaded");
        } else {
            tracing::debug!(post_id = %post_id, "Post gone before its comments arrived");
        }
        Ok(())
    }

    /// Apply every completion already queued without waiting.
    pub fn drain(&mut self) -> Vec<SyncError> {
        let mut errors = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let Err(e) = self.handle_event(event) {
                errors.push(e);
            }
        }
        errors
    }

    /// Wait until no request is outstanding, applying each completion.
    pub async fn settle(&mut self) -> Vec<SyncError> {
        let mut errors = Vec::new();
        while self.has_pending() {
            let Some(event) = self.next_event().await else {
                break;
            };
            if let Err(e) = self.handle_event(event) {
                errors.push(e);
            }
        }
        errors
    }
}
