//! Display-ordered comment list for a single post.
//!
//! Top-level comments are shown newest first. A reply sits directly below
//! the comment it answers, so the list is not chronological overall.

use super::types::{Comment, CommentId, PostId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CommentThread {
    post_id: PostId,
    entries: Vec<Comment>,
    reply_target: Option<CommentId>,
}

impl CommentThread {
    pub fn new(post_id: PostId) -> Self {
        Self {
            post_id,
            entries: Vec::new(),
            reply_target: None,
        }
    }

    /// Build the display order from a flat, unordered backend listing.
    ///
    /// Each top-level comment is followed by every reply in its subtree,
    /// oldest reply first. Replies whose root is missing from the listing
    /// go to the end in chronological order.
    pub fn from_fetched(post_id: PostId, mut comments: Vec<Comment>) -> Self {
        comments.retain(|c| c.post_id == post_id);
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let parents: HashMap<&CommentId, Option<&CommentId>> = comments
            .iter()
            .map(|c| (&c.id, c.parent_id.as_ref()))
            .collect();

        // Walk each reply up to its top-level ancestor. The hop limit guards
        // against parent cycles in malformed data.
        let root_of = |comment: &Comment| -> Option<CommentId> {
            let mut current = comment.parent_id.as_ref()?;
            for _ in 0..parents.len() {
                match parents.get(current) {
                    Some(Some(next)) => current = next,
                    Some(None) => return Some(current.clone()),
                    None => return None,
                }
            }
            None
        };

        let mut replies: HashMap<CommentId, Vec<Comment>> = HashMap::new();
        let mut orphans = Vec::new();
        let mut top_level = Vec::new();
        for comment in &comments {
            if !comment.is_reply() {
                top_level.push(comment.clone());
                continue;
            }
            match root_of(comment) {
                Some(root) => replies.entry(root).or_default().push(comment.clone()),
                None => orphans.push(comment.clone()),
            }
        }

        let mut entries = Vec::with_capacity(comments.len());
        for root in top_level.into_iter().rev() {
            let children = replies.remove(&root.id).unwrap_or_default();
            entries.push(root);
            entries.extend(children);
        }
        entries.extend(orphans);

        Self {
            post_id,
            entries,
            reply_target: None,
        }
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn comments(&self) -> &[Comment] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.entries.iter().find(|c| &c.id == id)
    }

    fn index_of(&self, id: &CommentId) -> Option<usize> {
        self.entries.iter().position(|c| &c.id == id)
    }

    /// Insert a comment the backend has confirmed. Returns its index.
    ///
    /// Top-level comments go to the front. A reply goes directly after its
    /// parent, or to the end when the parent is not loaded. A comment whose
    /// id is already present is left where it is.
    pub fn insert_confirmed(&mut self, comment: Comment) -> usize {
        if let Some(existing) = self.index_of(&comment.id) {
            return existing;
        }

        let index = match &comment.parent_id {
            None => 0,
            Some(parent) => match self.index_of(parent) {
                Some(parent_index) => parent_index + 1,
                None => {
                    tracing::debug!(
                        post_id = %self.post_id,
                        parent_id = %parent,
                        "Reply parent not loaded, appending"
                    );
                    self.entries.len()
                }
            },
        };
        self.entries.insert(index, comment);
        index
    }

    /// Remove a comment. Clears the reply target if it pointed at it.
    pub fn remove(&mut self, id: &CommentId) -> Option<Comment> {
        let index = self.index_of(id)?;
        if self.reply_target.as_ref() == Some(id) {
            self.reply_target = None;
        }
        Some(self.entries.remove(index))
    }

    /// Select the comment the next `add_comment` answers. Unknown ids are rejected.
    pub fn select_reply_target(&mut self, id: &CommentId) -> bool {
        if self.index_of(id).is_none() {
            return false;
        }
        self.reply_target = Some(id.clone());
        true
    }

    pub fn reply_target(&self) -> Option<&CommentId> {
        self.reply_target.as_ref()
    }

    pub fn clear_reply_target(&mut self) {
        self.reply_target = None;
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::comment;
    use super::*;
    use pretty_assertions::assert_eq;

    fn order(thread: &CommentThread) -> Vec<&str> {
        thread.comments().iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_from_fetched_orders_top_level_newest_first_with_replies() {
        let thread = CommentThread::from_fetched(
            PostId::from("P"),
            vec![
                comment("r2", Some("a"), 5),
                comment("a", None, 1),
                comment("b", None, 2),
                comment("r1", Some("a"), 3),
                comment("rr", Some("r1"), 4),
            ],
        );
        assert_eq!(order(&thread), vec!["b", "a", "r1", "rr", "r2"]);
    }

    #[test]
    fn test_from_fetched_appends_orphaned_replies() {
        let thread = CommentThread::from_fetched(
            PostId::from("P"),
            vec![comment("a", None, 1), comment("x", Some("gone"), 2)],
        );
        assert_eq!(order(&thread), vec!["a", "x"]);
    }

    #[test]
    fn test_from_fetched_survives_parent_cycle() {
        let thread = CommentThread::from_fetched(
            PostId::from("P"),
            vec![comment("x", Some("y"), 1), comment("y", Some("x"), 2)],
        );
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_insert_top_level_prepends() {
        let mut thread =
            CommentThread::from_fetched(PostId::from("P"), vec![comment("a", None, 1)]);
        let index = thread.insert_confirmed(comment("new", None, 9));
        assert_eq!(index, 0);
        assert_eq!(order(&thread), vec!["new", "a"]);
    }

    #[test]
    fn test_insert_reply_after_parent() {
        let mut thread = CommentThread::from_fetched(
            PostId::from("P"),
            vec![comment("a", None, 1), comment("b", None, 2)],
        );
        // Display order is [b, a]
        let index = thread.insert_confirmed(comment("reply", Some("b"), 3));
        assert_eq!(index, 1);
        assert_eq!(order(&thread), vec!["b", "reply", "a"]);
    }

    #[test]
    fn test_insert_reply_with_unknown_parent_appends() {
        let mut thread =
            CommentThread::from_fetched(PostId::from("P"), vec![comment("a", None, 1)]);
        thread.insert_confirmed(comment("reply", Some("missing"), 3));
        assert_eq!(order(&thread), vec!["a", "reply"]);
    }

    #[test]
    fn test_insert_existing_id_is_noop() {
        let mut thread =
            CommentThread::from_fetched(PostId::from("P"), vec![comment("a", None, 1)]);
        thread.insert_confirmed(comment("a", None, 1));
        assert_eq!(thread.len(), 1);
    }

    #[test]
    fn test_remove_clears_matching_reply_target() {
        let mut thread = CommentThread::from_fetched(
            PostId::from("P"),
            vec![comment("a", None, 1), comment("b", None, 2)],
        );
        assert!(thread.select_reply_target(&CommentId::from("a")));

        thread.remove(&CommentId::from("b"));
        assert_eq!(thread.reply_target(), Some(&CommentId::from("a")));

        thread.remove(&CommentId::from("a"));
        assert_eq!(thread.reply_target(), None);
        assert!(thread.is_empty());
    }

    #[test]
    fn test_select_unknown_reply_target_rejected() {
        let mut thread = CommentThread::new(PostId::from("P"));
        assert!(!thread.select_reply_target(&CommentId::from("nope")));
        assert!(thread.reply_target().is_none());
    }
}
