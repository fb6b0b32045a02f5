//! Ordered, deduplicated post collection.
//!
//! Posts live in a map keyed by id; display order is a separate id list.
//! Merges are linear in the size of the incoming page and never introduce a
//! duplicate id. Comment threads are stored alongside their post and are
//! dropped when a replace removes the post.

use super::comments::CommentThread;
use super::types::{clamp_count, Post, PostId, PostPatch};
use std::collections::HashMap;

/// How a fetched page is combined with the current contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Discard current contents and take the page as-is (pull to refresh).
    Replace,
    /// Keep current contents and add unseen posts at the end (load more).
    Append,
}

#[derive(Debug, Default)]
pub struct FeedStore {
    posts: HashMap<PostId, Post>,
    order: Vec<PostId>,
    threads: HashMap<PostId, CommentThread>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a page of posts and return how many ids were newly added.
    ///
    /// Duplicate ids inside `items` keep their first occurrence. In
    /// [`MergeMode::Append`] an id already in the store is skipped entirely;
    /// the stored copy is not refreshed.
    pub fn merge(&mut self, items: Vec<Post>, mode: MergeMode) -> usize {
        match mode {
            MergeMode::Replace => {
                self.posts.clear();
                self.order.clear();
            }
            MergeMode::Append => {}
        }

        let mut added = 0;
        for post in items {
            if self.posts.contains_key(&post.id) {
                tracing::debug!(post_id = %post.id, ?mode, "Skipping duplicate post in merge");
                continue;
            }
            self.order.push(post.id.clone());
            self.posts.insert(post.id.clone(), post);
            added += 1;
        }

        if mode == MergeMode::Replace {
            let posts = &self.posts;
            self.threads.retain(|id, _| posts.contains_key(id));
        }

        added
    }

    pub fn get(&self, id: &PostId) -> Option<&Post> {
        self.posts.get(id)
    }

    /// Patch a single post. Returns `false` (and changes nothing) when the
    /// id is unknown. Counts below zero are stored as zero.
    pub fn set(&mut self, id: &PostId, patch: PostPatch) -> bool {
        let Some(post) = self.posts.get_mut(id) else {
            tracing::debug!(post_id = %id, "Ignoring patch for unknown post");
            return false;
        };

        if let Some(likes) = patch.likes_count {
            if likes < 0 {
                tracing::debug!(post_id = %id, likes, "Clamping negative like count");
            }
            post.likes_count = clamp_count(likes);
        }
        if let Some(comments) = patch.comments_count {
            post.comments_count = clamp_count(comments);
        }
        if let Some(liked) = patch.user_has_liked {
            post.user_has_liked = liked;
        }
        true
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.posts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Posts in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Post> + '_ {
        self.order.iter().filter_map(|id| self.posts.get(id))
    }

    pub fn ids(&self) -> &[PostId] {
        &self.order
    }

    pub fn position(&self, id: &PostId) -> Option<usize> {
        self.order.iter().position(|p| p == id)
    }

    pub fn at(&self, index: usize) -> Option<&Post> {
        self.order.get(index).and_then(|id| self.posts.get(id))
    }

    // ------------------------------------------------------------------------
    // Comment threads
    // ------------------------------------------------------------------------

    pub fn thread(&self, post_id: &PostId) -> Option<&CommentThread> {
        self.threads.get(post_id)
    }

    pub fn thread_mut(&mut self, post_id: &PostId) -> Option<&mut CommentThread> {
        self.threads.get_mut(post_id)
    }

    /// Install a freshly fetched thread. Ignored for posts not in the store.
    pub fn replace_thread(&mut self, thread: CommentThread) -> bool {
        if !self.posts.contains_key(thread.post_id()) {
            return false;
        }
        self.threads.insert(thread.post_id().clone(), thread);
        true
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        use std::collections::HashSet;
        let unique: HashSet<&PostId> = self.order.iter().collect();
        assert_eq!(unique.len(), self.order.len(), "duplicate ids in order");
        assert_eq!(self.order.len(), self.posts.len(), "order/map size mismatch");
    }
}

impl FromIterator<Post> for FeedStore {
    fn from_iter<T: IntoIterator<Item = Post>>(iter: T) -> Self {
        let mut store = FeedStore::new();
        store.merge(iter.into_iter().collect(), MergeMode::Replace);
        store
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::store::UserId;
    use chrono::{TimeZone, Utc};

    pub fn post(id: &str) -> Post {
        Post {
            id: PostId::from(id),
            author_id: UserId::from("author"),
            text: Some(format!("post {id}")),
            media: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            likes_count: 0,
            comments_count: 0,
            user_has_liked: false,
        }
    }

    pub fn post_with_likes(id: &str, likes: u64, liked: bool) -> Post {
        Post {
            likes_count: likes,
            user_has_liked: liked,
            ..post(id)
        }
    }

    pub fn ids(store: &FeedStore) -> Vec<&str> {
        store.ids().iter().map(PostId::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{ids, post, post_with_likes};
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_replace_then_append_dedups() {
        let mut store = FeedStore::new();
        store.merge(vec![post("A"), post("B"), post("C")], MergeMode::Replace);
        let added = store.merge(vec![post("C"), post("D")], MergeMode::Append);

        assert_eq!(added, 1);
        assert_eq!(ids(&store), vec!["A", "B", "C", "D"]);
        store.assert_consistent();
    }

    #[test]
    fn test_replace_discards_previous_contents() {
        let mut store = FeedStore::new();
        store.merge(vec![post("A"), post("B")], MergeMode::Replace);
        store.merge(vec![post("C"), post("A")], MergeMode::Replace);

        assert_eq!(ids(&store), vec!["C", "A"]);
        assert!(store.get(&PostId::from("B")).is_none());
    }

    #[test]
    fn test_replace_drops_duplicate_ids_within_page() {
        let mut store = FeedStore::new();
        let added = store.merge(vec![post("A"), post("A"), post("B")], MergeMode::Replace);
        assert_eq!(added, 2);
        assert_eq!(ids(&store), vec!["A", "B"]);
    }

    #[test]
    fn test_append_does_not_overwrite_existing_post() {
        let mut store = FeedStore::new();
        store.merge(vec![post_with_likes("A", 3, true)], MergeMode::Replace);
        store.merge(vec![post_with_likes("A", 99, false)], MergeMode::Append);

        let a = store.get(&PostId::from("A")).unwrap();
        assert_eq!(a.likes_count, 3);
        assert!(a.user_has_liked);
    }

    #[test]
    fn test_set_unknown_id_is_noop() {
        let mut store = FeedStore::new();
        let changed = store.set(
            &PostId::from("ghost"),
            PostPatch {
                likes_count: Some(4),
                ..Default::default()
            },
        );
        assert!(!changed);
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_clamps_negative_counts() {
        let mut store: FeedStore = vec![post_with_likes("A", 0, false)].into_iter().collect();
        store.set(
            &PostId::from("A"),
            PostPatch {
                likes_count: Some(-1),
                comments_count: Some(-7),
                user_has_liked: None,
            },
        );
        let a = store.get(&PostId::from("A")).unwrap();
        assert_eq!(a.likes_count, 0);
        assert_eq!(a.comments_count, 0);
    }

    #[test]
    fn test_replace_keeps_threads_of_surviving_posts() {
        let mut store: FeedStore = vec![post("A"), post("B")].into_iter().collect();
        store.replace_thread(CommentThread::new(PostId::from("A")));
        store.replace_thread(CommentThread::new(PostId::from("B")));

        store.merge(vec![post("B")], MergeMode::Replace);

        assert!(store.thread(&PostId::from("A")).is_none());
        assert!(store.thread(&PostId::from("B")).is_some());
    }

    #[test]
    fn test_replace_thread_for_unknown_post_is_rejected() {
        let mut store = FeedStore::new();
        assert!(!store.replace_thread(CommentThread::new(PostId::from("X"))));
    }

    proptest! {
        #[test]
        fn prop_merge_never_duplicates(
            first in prop::collection::vec(0u8..20, 0..15),
            pages in prop::collection::vec(prop::collection::vec(0u8..20, 0..10), 0..5),
        ) {
            let mut store = FeedStore::new();
            store.merge(first.iter().map(|n| post(&n.to_string())).collect(), MergeMode::Replace);
            for page in &pages {
                let before: Vec<PostId> = store.ids().to_vec();
                store.merge(page.iter().map(|n| post(&n.to_string())).collect(), MergeMode::Append);
                // Existing order is a prefix of the new order
                prop_assert_eq!(&store.ids()[..before.len()], &before[..]);
            }
            store.assert_consistent();
        }

        #[test]
        fn prop_set_never_goes_negative(start in 0u64..5, delta in -10i64..10) {
            let mut store: FeedStore =
                vec![post_with_likes("A", start, false)].into_iter().collect();
            store.set(&PostId::from("A"), PostPatch {
                likes_count: Some(start as i64 + delta),
                ..Default::default()
            });
            let likes = store.get(&PostId::from("A")).unwrap().likes_count;
            prop_assert_eq!(likes, (start as i64 + delta).max(0) as u64);
        }
    }
}
