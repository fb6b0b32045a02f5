use crate::api::ReactionResult;
use crate::store::{FeedStore, LikeState, PostId, PostPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Committed,
    RolledBack,
}

/// A speculative like toggle.
///
/// The value captures the pre-toggle state when it is created, so applying,
/// reconciling and rolling back are plain functions of the value and the
/// store. Each transition out of `Pending` happens at most once; later calls
/// are no-ops and return `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeMutation {
    post_id: PostId,
    previous: LikeState,
    status: MutationStatus,
}

impl LikeMutation {
    /// Snapshot the post's current like state. `None` if the post is unknown.
    pub fn capture(store: &FeedStore, post_id: &PostId) -> Option<Self> {
        let post = store.get(post_id)?;
        Some(Self {
            post_id: post_id.clone(),
            previous: post.like_state(),
            status: MutationStatus::Pending,
        })
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn previous(&self) -> LikeState {
        self.previous
    }

    pub fn status(&self) -> MutationStatus {
        self.status
    }

    /// The flipped state shown while the request is in flight.
    pub fn optimistic(&self) -> LikeState {
        let user_has_liked = !self.previous.user_has_liked;
        let likes_count = if user_has_liked {
            self.previous.likes_count.saturating_add(1)
        } else {
            self.previous.likes_count.saturating_sub(1)
        };
        LikeState {
            user_has_liked,
            likes_count,
        }
    }

    pub fn apply(&self, store: &mut FeedStore) -> bool {
        if self.status != MutationStatus::Pending {
            return false;
        }
        store.set(&self.post_id, PostPatch::like_state(self.optimistic()))
    }

    /// Server wins for every field it reports; unreported fields keep the
    /// optimistic value.
    pub fn reconcile(&mut self, store: &mut FeedStore, result: &ReactionResult) -> bool {
        if self.status != MutationStatus::Pending {
            return false;
        }
        let patch = PostPatch {
            likes_count: result.likes_count,
            user_has_liked: result.liked,
            comments_count: None,
        };
        if !patch.is_empty() {
            store.set(&self.post_id, patch);
        }
        self.status = MutationStatus::Committed;
        true
    }

    /// Restore the exact pre-toggle snapshot.
    pub fn rollback(&mut self, store: &mut FeedStore) -> bool {
        if self.status != MutationStatus::Pending {
            return false;
        }
        store.set(&self.post_id, PostPatch::like_state(self.previous));
        self.status = MutationStatus::RolledBack;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::post_with_likes;

    fn state(store: &FeedStore, id: &str) -> LikeState {
        store.get(&PostId::from(id)).unwrap().like_state()
    }

    fn like(liked: bool, count: u64) -> LikeState {
        LikeState {
            user_has_liked: liked,
            likes_count: count,
        }
    }

    #[test]
    fn test_apply_flips_and_counts() {
        let mut store: FeedStore = vec![post_with_likes("P", 5, false)].into_iter().collect();
        let mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        mutation.apply(&mut store);
        assert_eq!(state(&store, "P"), like(true, 6));
    }

    #[test]
    fn test_rollback_restores_exact_snapshot() {
        let mut store: FeedStore = vec![post_with_likes("P", 5, false)].into_iter().collect();
        let mut mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        mutation.apply(&mut store);

        assert!(mutation.rollback(&mut store));
        assert_eq!(state(&store, "P"), like(false, 5));
        assert_eq!(mutation.status(), MutationStatus::RolledBack);
    }

    #[test]
    fn test_reconcile_server_values_win() {
        let mut store: FeedStore = vec![post_with_likes("P", 5, false)].into_iter().collect();
        let mut mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        mutation.apply(&mut store);

        mutation.reconcile(
            &mut store,
            &ReactionResult {
                liked: Some(true),
                likes_count: Some(9),
            },
        );
        assert_eq!(state(&store, "P"), like(true, 9));
        assert_eq!(mutation.status(), MutationStatus::Committed);
    }

    #[test]
    fn test_reconcile_partial_report_keeps_optimistic_fields() {
        let mut store: FeedStore = vec![post_with_likes("P", 5, false)].into_iter().collect();
        let mut mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        mutation.apply(&mut store);

        mutation.reconcile(
            &mut store,
            &ReactionResult {
                liked: None,
                likes_count: Some(12),
            },
        );
        assert_eq!(state(&store, "P"), like(true, 12));
    }

    #[test]
    fn test_reconcile_negative_server_count_clamps() {
        let mut store: FeedStore = vec![post_with_likes("P", 1, true)].into_iter().collect();
        let mut mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        mutation.apply(&mut store);
        mutation.reconcile(
            &mut store,
            &ReactionResult {
                liked: Some(false),
                likes_count: Some(-3),
            },
        );
        assert_eq!(state(&store, "P"), like(false, 0));
    }

    #[test]
    fn test_unlike_at_zero_never_goes_negative() {
        // Inconsistent server data: liked but zero count
        let mut store: FeedStore = vec![post_with_likes("P", 0, true)].into_iter().collect();
        for _ in 0..3 {
            let mut mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
            mutation.apply(&mut store);
            mutation.rollback(&mut store);
        }
        assert_eq!(state(&store, "P"), like(true, 0));

        let mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        mutation.apply(&mut store);
        assert_eq!(state(&store, "P"), like(false, 0));
    }

    #[test]
    fn test_transitions_happen_once() {
        let mut store: FeedStore = vec![post_with_likes("P", 5, false)].into_iter().collect();
        let mut mutation = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        mutation.apply(&mut store);
        assert!(mutation.reconcile(&mut store, &ReactionResult::default()));

        assert!(!mutation.rollback(&mut store));
        assert!(!mutation.apply(&mut store));
        assert_eq!(state(&store, "P"), like(true, 6));
    }

    #[test]
    fn test_rollback_ignores_interleaved_changes_on_other_posts() {
        let mut store: FeedStore = vec![
            post_with_likes("P", 5, false),
            post_with_likes("Q", 1, false),
        ]
        .into_iter()
        .collect();
        let mut p = LikeMutation::capture(&store, &PostId::from("P")).unwrap();
        p.apply(&mut store);
        let q = LikeMutation::capture(&store, &PostId::from("Q")).unwrap();
        q.apply(&mut store);

        p.rollback(&mut store);
        assert_eq!(state(&store, "P"), like(false, 5));
        assert_eq!(state(&store, "Q"), like(true, 2));
    }

    #[test]
    fn test_capture_unknown_post() {
        let store = FeedStore::new();
        assert!(LikeMutation::capture(&store, &PostId::from("nope")).is_none());
    }
}
