//! In-memory state shared by the sync engine and the rendering layer.
//!
//! - [`FeedStore`] holds posts keyed by id plus their display order
//! - [`CommentThread`] holds the display-ordered comments of one post
//!
//! Every mutation goes through `merge`, `set` or a thread method so the
//! no-duplicate and non-negative-count invariants are enforced in one place.

mod comments;
mod feed_store;
mod types;

pub use comments::CommentThread;
pub use feed_store::{FeedStore, MergeMode};
pub use types::{
    Comment, CommentId, LikeState, MediaKind, MediaRef, Post, PostId, PostPatch, UserId, Viewer,
};

#[cfg(test)]
pub(crate) use comments::fixtures as comment_fixtures;
#[cfg(test)]
pub(crate) use feed_store::fixtures;
