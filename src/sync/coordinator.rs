use super::{
    spawn_request, Dispatch, IgnoreReason, LikeMutation, Operation, SyncError, SyncEvent,
};
use crate::api::{ApiError, FeedApi, ReactionKind, ReactionResult};
use crate::store::{Comment, CommentId, FeedStore, LikeState, PostId, PostPatch};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Executes reactions and comment writes against the store.
///
/// Likes are optimistic: the flipped state is applied before the request is
/// sent and either reconciled with the server's values or rolled back to the
/// captured snapshot. Comment creates and deletes touch local state only
/// after the backend confirms. Reports never touch local state.
///
/// At most one like per post and one delete per comment are in flight;
/// repeat requests while one is pending are ignored, not queued.
pub struct MutationCoordinator {
    api: Arc<dyn FeedApi>,
    tx: mpsc::Sender<SyncEvent>,
    pending_likes: HashMap<PostId, LikeMutation>,
    pending_deletes: HashSet<CommentId>,
    pending_adds: HashMap<PostId, usize>,
    pending_reports: usize,
}

impl MutationCoordinator {
    pub fn new(api: Arc<dyn FeedApi>, tx: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            api,
            tx,
            pending_likes: HashMap::new(),
            pending_deletes: HashSet::new(),
            pending_adds: HashMap::new(),
            pending_reports: 0,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_likes.is_empty()
            || !self.pending_deletes.is_empty()
            || !self.pending_adds.is_empty()
            || self.pending_reports > 0
    }

    pub fn is_like_pending(&self, post_id: &PostId) -> bool {
        self.pending_likes.contains_key(post_id)
    }

    pub fn is_delete_pending(&self, comment_id: &CommentId) -> bool {
        self.pending_deletes.contains(comment_id)
    }

    // ------------------------------------------------------------------------
    // Likes
    // ------------------------------------------------------------------------

    /// Flip the like locally and send the reaction.
    pub fn toggle_like(&mut self, store: &mut FeedStore, post_id: &PostId) -> Dispatch {
        if self.pending_likes.contains_key(post_id) {
            tracing::debug!(post_id = %post_id, "Like already pending, ignoring");
            return Dispatch::Ignored(IgnoreReason::AlreadyPending);
        }
        let Some(mutation) = LikeMutation::capture(store, post_id) else {
            return Dispatch::Ignored(IgnoreReason::UnknownPost);
        };

        mutation.apply(store);
        tracing::debug!(
            post_id = %post_id,
            liked = mutation.optimistic().user_has_liked,
            likes = mutation.optimistic().likes_count,
            "Applied optimistic like"
        );
        self.pending_likes.insert(post_id.clone(), mutation);

        let api = Arc::clone(&self.api);
        let request_id = post_id.clone();
        let event_id = post_id.clone();
        spawn_request(
            &self.tx,
            "react",
            async move { api.react(&request_id, ReactionKind::Like).await },
            move |result| SyncEvent::LikeSettled {
                post_id: event_id,
                result,
            },
        );
        Dispatch::Sent
    }

    /// Settle a pending like. `None` when no like was pending for the post.
    pub fn on_like_settled(
        &mut self,
        store: &mut FeedStore,
        post_id: &PostId,
        result: Result<ReactionResult, ApiError>,
    ) -> Option<Result<LikeState, SyncError>> {
        let Some(mut mutation) = self.pending_likes.remove(post_id) else {
            tracing::warn!(post_id = %post_id, "Reaction result with no pending like");
            return None;
        };

        let outcome = match result {
            Ok(reaction) => {
                mutation.reconcile(store, &reaction);
                let state = store
                    .get(post_id)
                    .map(|p| p.like_state())
                    .unwrap_or_else(|| mutation.optimistic());
                tracing::info!(
                    post_id = %post_id,
                    liked = state.user_has_liked,
                    likes = state.likes_count,
                    "Like committed"
                );
                Ok(state)
            }
            Err(e) => {
                mutation.rollback(store);
                tracing::warn!(post_id = %post_id, error = %e, "Like failed, rolling back");
                Err(SyncError::from_api(Operation::Like, &e))
            }
        };
        Some(outcome)
    }

    // ------------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------------

    /// Send a new comment. Nothing changes locally until it is confirmed.
    pub fn add_comment(
        &mut self,
        store: &FeedStore,
        post_id: &PostId,
        text: &str,
        parent_id: Option<CommentId>,
    ) -> Dispatch {
        let text = text.trim();
        if text.is_empty() {
            return Dispatch::Ignored(IgnoreReason::EmptyText);
        }
        if !store.contains(post_id) {
            return Dispatch::Ignored(IgnoreReason::UnknownPost);
        }

        *self.pending_adds.entry(post_id.clone()).or_insert(0) += 1;

        let api = Arc::clone(&self.api);
        let request_id = post_id.clone();
        let event_id = post_id.clone();
        let text = text.to_string();
        spawn_request(
            &self.tx,
            "add_comment",
            async move {
                api.add_comment(&request_id, &text, parent_id.as_ref())
                    .await
            },
            move |result| SyncEvent::CommentAdded {
                post_id: event_id,
                result,
            },
        );
        Dispatch::Sent
    }

    /// Insert a confirmed comment and bump the post's comment count.
    pub fn on_comment_added(
        &mut self,
        store: &mut FeedStore,
        post_id: &PostId,
        result: Result<Comment, ApiError>,
    ) -> Result<Comment, SyncError> {
        if let Some(count) = self.pending_adds.get_mut(post_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.pending_adds.remove(post_id);
            }
        }

        let comment = match result {
            Ok(comment) => comment,
            Err(e) => {
                tracing::warn!(post_id = %post_id, error = %e, "Comment create failed");
                return Err(SyncError::from_api(Operation::AddComment, &e));
            }
        };

        let mut is_new = true;
        if let Some(thread) = store.thread_mut(post_id) {
            is_new = thread.get(&comment.id).is_none();
            thread.insert_confirmed(comment.clone());
            if comment.parent_id.is_some() && thread.reply_target() == comment.parent_id.as_ref() {
                thread.clear_reply_target();
            }
        }
        if is_new {
            if let Some(post) = store.get(post_id) {
                let count = post.comments_count as i64;
                store.set(
                    post_id,
                    PostPatch {
                        comments_count: Some(count.saturating_add(1)),
                        ..Default::default()
                    },
                );
            }
        }

        tracing::info!(post_id = %post_id, comment_id = %comment.id, "Comment added");
        Ok(comment)
    }

    /// Send a delete. Ignored while a delete for the same comment is in flight.
    pub fn delete_comment(&mut self, post_id: &PostId, comment_id: &CommentId) -> Dispatch {
        if !self.pending_deletes.insert(comment_id.clone()) {
            tracing::debug!(comment_id = %comment_id, "Delete already pending, ignoring");
            return Dispatch::Ignored(IgnoreReason::AlreadyPending);
        }

        let api = Arc::clone(&self.api);
        let (request_post, request_comment) = (post_id.clone(), comment_id.clone());
        let (event_post, event_comment) = (post_id.clone(), comment_id.clone());
        spawn_request(
            &self.tx,
            "delete_comment",
            async move { api.delete_comment(&request_post, &request_comment).await },
            move |result| SyncEvent::CommentDeleted {
                post_id: event_post,
                comment_id: event_comment,
                result,
            },
        );
        Dispatch::Sent
    }

    /// Remove a confirmed-deleted comment. `None` when no delete was pending.
    pub fn on_comment_deleted(
        &mut self,
        store: &mut FeedStore,
        post_id: &PostId,
        comment_id: &CommentId,
        result: Result<(), ApiError>,
    ) -> Option<Result<(), SyncError>> {
        if !self.pending_deletes.remove(comment_id) {
            tracing::warn!(comment_id = %comment_id, "Delete result with no pending delete");
            return None;
        }

        if let Err(e) = result {
            tracing::warn!(
                post_id = %post_id,
                comment_id = %comment_id,
                error = %e,
                "Comment delete failed"
            );
            return Some(Err(SyncError::from_api(Operation::DeleteComment, &e)));
        }

        // Only count the removal once: when the thread is loaded, a comment
        // already gone from it has already been accounted for.
        let counted = match store.thread_mut(post_id) {
            Some(thread) => thread.remove(comment_id).is_some(),
            None => true,
        };
        if counted {
            if let Some(post) = store.get(post_id) {
                let count = post.comments_count as i64;
                store.set(
                    post_id,
                    PostPatch {
                        comments_count: Some(count - 1),
                        ..Default::default()
                    },
                );
            }
        }

        tracing::info!(post_id = %post_id, comment_id = %comment_id, "Comment deleted");
        Some(Ok(()))
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    pub fn report(&mut self, post_id: &PostId, reason: &str) -> Dispatch {
        let reason = reason.trim();
        if reason.is_empty() {
            return Dispatch::Ignored(IgnoreReason::EmptyText);
        }
        self.pending_reports += 1;

        let api = Arc::clone(&self.api);
        let request_id = post_id.clone();
        let event_id = post_id.clone();
        let reason = reason.to_string();
        spawn_request(
            &self.tx,
            "report",
            async move { api.report(&request_id, &reason).await },
            move |result| SyncEvent::Reported {
                post_id: event_id,
                result,
            },
        );
        Dispatch::Sent
    }

    pub fn on_reported(
        &mut self,
        post_id: &PostId,
        result: Result<(), ApiError>,
    ) -> Result<(), SyncError> {
        self.pending_reports = self.pending_reports.saturating_sub(1);
        match result {
            Ok(()) => {
                tracing::info!(post_id = %post_id, "Report submitted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(post_id = %post_id, error = %e, "Report failed");
                Err(SyncError::from_api(Operation::Report, &e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedApi;
    use crate::store::comment_fixtures::comment;
    use crate::store::fixtures::{post, post_with_likes};
    use crate::store::CommentThread;
    use crate::sync::EVENT_CHANNEL_CAPACITY;
    use pretty_assertions::assert_eq;

    struct Harness {
        api: Arc<ScriptedApi>,
        coordinator: MutationCoordinator,
        rx: mpsc::Receiver<SyncEvent>,
        store: FeedStore,
    }

    impl Harness {
        fn new(posts: Vec<crate::store::Post>) -> Self {
            let api = Arc::new(ScriptedApi::new());
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let coordinator = MutationCoordinator::new(api.clone(), tx);
            Self {
                api,
                coordinator,
                rx,
                store: posts.into_iter().collect(),
            }
        }

        /// Deliver the next completion to its handler.
        async fn settle_one(&mut self) {
            let event = self.rx.recv().await.expect("event channel closed");
            let (store, coordinator) = (&mut self.store, &mut self.coordinator);
            match event {
                SyncEvent::LikeSettled { post_id, result } => {
                    coordinator.on_like_settled(store, &post_id, result);
                }
                SyncEvent::CommentAdded { post_id, result } => {
                    let _ = coordinator.on_comment_added(store, &post_id, result);
                }
                SyncEvent::CommentDeleted {
                    post_id,
                    comment_id,
                    result,
                } => {
                    coordinator.on_comment_deleted(store, &post_id, &comment_id, result);
                }
                SyncEvent::Reported { post_id, result } => {
                    let _ = coordinator.on_reported(&post_id, result);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        fn like_state(&self, id: &str) -> (u64, bool) {
            let post = self.store.get(&PostId::from(id)).unwrap();
            (post.likes_count, post.user_has_liked)
        }
    }

    #[tokio::test]
    async fn test_repeated_toggle_while_pending_sends_once() {
        let mut h = Harness::new(vec![post_with_likes("P", 5, false)]);
        let id = PostId::from("P");

        assert_eq!(
            h.coordinator.toggle_like(&mut h.store, &id),
            Dispatch::Sent
        );
        for _ in 0..5 {
            assert_eq!(
                h.coordinator.toggle_like(&mut h.store, &id),
                Dispatch::Ignored(IgnoreReason::AlreadyPending)
            );
        }
        assert_eq!(h.like_state("P"), (6, true));

        h.settle_one().await;
        assert_eq!(h.api.calls_to("react"), 1);
        assert!(!h.coordinator.has_pending());
    }

    #[tokio::test]
    async fn test_failed_like_rolls_back_exactly() {
        let mut h = Harness::new(vec![post_with_likes("P", 5, false)]);
        h.api.push_reaction(Err(ApiError::Server(503)));

        h.coordinator.toggle_like(&mut h.store, &PostId::from("P"));
        assert_eq!(h.like_state("P"), (6, true));

        h.settle_one().await;
        assert_eq!(h.like_state("P"), (5, false));
    }

    #[tokio::test]
    async fn test_successful_like_takes_server_values() {
        let mut h = Harness::new(vec![post_with_likes("P", 5, false)]);
        h.api.push_reaction(Ok(ReactionResult {
            liked: Some(true),
            likes_count: Some(9),
        }));

        h.coordinator.toggle_like(&mut h.store, &PostId::from("P"));
        h.settle_one().await;
        assert_eq!(h.like_state("P"), (9, true));
    }

    #[tokio::test]
    async fn test_guard_released_after_resolution() {
        let mut h = Harness::new(vec![post_with_likes("P", 5, false)]);
        let id = PostId::from("P");

        h.coordinator.toggle_like(&mut h.store, &id);
        h.settle_one().await;
        assert_eq!(
            h.coordinator.toggle_like(&mut h.store, &id),
            Dispatch::Sent
        );
        h.settle_one().await;

        assert_eq!(h.api.calls_to("react"), 2);
        assert_eq!(h.like_state("P"), (5, false));
    }

    #[tokio::test]
    async fn test_likes_on_different_posts_are_independent() {
        let mut h = Harness::new(vec![
            post_with_likes("P", 5, false),
            post_with_likes("Q", 0, false),
        ]);
        h.api.push_reaction(Err(ApiError::Timeout));
        h.api.push_reaction(Ok(ReactionResult::default()));

        h.coordinator.toggle_like(&mut h.store, &PostId::from("P"));
        h.coordinator.toggle_like(&mut h.store, &PostId::from("Q"));
        h.settle_one().await;
        h.settle_one().await;

        assert_eq!(h.like_state("P"), (5, false));
        assert_eq!(h.like_state("Q"), (1, true));
    }

    #[tokio::test]
    async fn test_toggle_unknown_post_is_ignored() {
        let mut h = Harness::new(vec![]);
        assert_eq!(
            h.coordinator.toggle_like(&mut h.store, &PostId::from("ghost")),
            Dispatch::Ignored(IgnoreReason::UnknownPost)
        );
        assert!(!h.coordinator.has_pending());
    }

    #[tokio::test]
    async fn test_add_comment_waits_for_confirmation() {
        let mut h = Harness::new(vec![post("P")]);
        h.store.replace_thread(CommentThread::from_fetched(
            PostId::from("P"),
            vec![comment("a", None, 1)],
        ));
        h.api.push_added(Ok(comment("new", None, 5)));

        let dispatch = h
            .coordinator
            .add_comment(&h.store, &PostId::from("P"), "  hello  ", None);
        assert_eq!(dispatch, Dispatch::Sent);
        assert_eq!(h.store.thread(&PostId::from("P")).unwrap().len(), 1);

        h.settle_one().await;
        let thread = h.store.thread(&PostId::from("P")).unwrap();
        assert_eq!(thread.comments()[0].id.as_str(), "new");
        assert_eq!(h.store.get(&PostId::from("P")).unwrap().comments_count, 1);
        assert_eq!(h.api.call_log(), vec!["add_comment:P:-:hello".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_add_comment_leaves_state_untouched() {
        let mut h = Harness::new(vec![post("P")]);
        h.store.replace_thread(CommentThread::new(PostId::from("P")));
        h.api.push_added(Err(ApiError::Rejected {
            status: 400,
            message: "Too long".into(),
        }));

        h.coordinator.add_comment(&h.store, &PostId::from("P"), "text", None);
        let event = h.rx.recv().await.unwrap();
        let SyncEvent::CommentAdded { post_id, result } = event else {
            panic!("expected CommentAdded");
        };
        let err = h
            .coordinator
            .on_comment_added(&mut h.store, &post_id, result)
            .unwrap_err();

        assert_eq!(err.reason, "Too long");
        assert!(!err.transient);
        assert!(h.store.thread(&PostId::from("P")).unwrap().is_empty());
        assert_eq!(h.store.get(&PostId::from("P")).unwrap().comments_count, 0);
        assert!(!h.coordinator.has_pending());
    }

    #[tokio::test]
    async fn test_confirmed_reply_lands_after_parent_and_clears_target() {
        let mut h = Harness::new(vec![post("P")]);
        let mut thread = CommentThread::from_fetched(
            PostId::from("P"),
            vec![comment("a", None, 1), comment("b", None, 2)],
        );
        thread.select_reply_target(&CommentId::from("a"));
        h.store.replace_thread(thread);
        h.api.push_added(Ok(comment("r", Some("a"), 3)));

        h.coordinator.add_comment(
            &h.store,
            &PostId::from("P"),
            "reply",
            Some(CommentId::from("a")),
        );
        h.settle_one().await;

        let thread = h.store.thread(&PostId::from("P")).unwrap();
        let order: Vec<&str> = thread.comments().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "r"]);
        assert!(thread.reply_target().is_none());
    }

    #[tokio::test]
    async fn test_blank_comment_is_not_sent() {
        let mut h = Harness::new(vec![post("P")]);
        assert_eq!(
            h.coordinator
                .add_comment(&h.store, &PostId::from("P"), "   ", None),
            Dispatch::Ignored(IgnoreReason::EmptyText)
        );
        assert_eq!(h.api.calls_to("add_comment"), 0);
    }

    #[tokio::test]
    async fn test_delete_single_flight_and_count_clamp() {
        let mut h = Harness::new(vec![post("P")]);
        let mut thread =
            CommentThread::from_fetched(PostId::from("P"), vec![comment("a", None, 1)]);
        thread.select_reply_target(&CommentId::from("a"));
        h.store.replace_thread(thread);

        let (pid, cid) = (PostId::from("P"), CommentId::from("a"));
        assert_eq!(h.coordinator.delete_comment(&pid, &cid), Dispatch::Sent);
        assert_eq!(
            h.coordinator.delete_comment(&pid, &cid),
            Dispatch::Ignored(IgnoreReason::AlreadyPending)
        );
        // Still present until confirmed
        assert_eq!(h.store.thread(&pid).unwrap().len(), 1);

        h.settle_one().await;
        let thread = h.store.thread(&pid).unwrap();
        assert!(thread.is_empty());
        assert!(thread.reply_target().is_none());
        // comments_count was already 0
        assert_eq!(h.store.get(&pid).unwrap().comments_count, 0);
        assert_eq!(h.api.calls_to("delete_comment"), 1);
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_comment() {
        let mut h = Harness::new(vec![post("P")]);
        h.store.replace_thread(CommentThread::from_fetched(
            PostId::from("P"),
            vec![comment("a", None, 1)],
        ));
        h.api.push_delete(Err(ApiError::Server(500)));

        h.coordinator.delete_comment(&PostId::from("P"), &CommentId::from("a"));
        h.settle_one().await;

        assert_eq!(h.store.thread(&PostId::from("P")).unwrap().len(), 1);
        assert!(!h.coordinator.is_delete_pending(&CommentId::from("a")));
    }

    #[tokio::test]
    async fn test_report_never_touches_store() {
        let mut h = Harness::new(vec![post_with_likes("P", 3, true)]);
        h.api.push_report(Err(ApiError::Timeout));

        assert_eq!(
            h.coordinator.report(&PostId::from("P"), "spam"),
            Dispatch::Sent
        );
        let event = h.rx.recv().await.unwrap();
        let SyncEvent::Reported { post_id, result } = event else {
            panic!("expected Reported");
        };
        assert!(h.coordinator.on_reported(&post_id, result).is_err());
        assert_eq!(h.like_state("P"), (3, true));
        assert!(!h.coordinator.has_pending());
    }
}
