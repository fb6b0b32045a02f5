//! Backend feed API.
//!
//! - [`FeedApi`] - the round trips the sync engine depends on
//! - [`HttpFeedApi`] - JSON-over-HTTPS implementation using `reqwest`
//! - [`ApiError`] - transport and rejection taxonomy
//!
//! The trait is object safe so controllers can hold an `Arc<dyn FeedApi>`
//! handed to them at construction.

mod error;
mod http;

pub use error::ApiError;
pub use http::HttpFeedApi;

use crate::store::{Comment, CommentId, Post, PostId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One page of the feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub items: Vec<Post>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
}

/// Authoritative reaction state returned by the backend.
///
/// Either field may be absent; only reported fields override local state.
/// The count is signed on the wire and clamped when applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResult {
    #[serde(default)]
    pub liked: Option<bool>,
    #[serde(default)]
    pub likes_count: Option<i64>,
}

#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Fetch the page starting at `cursor` (`None` for the first page).
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> Result<Page, ApiError>;

    /// Toggle a reaction for the current user.
    async fn react(&self, post_id: &PostId, kind: ReactionKind)
        -> Result<ReactionResult, ApiError>;

    async fn fetch_comments(&self, post_id: &PostId) -> Result<Vec<Comment>, ApiError>;

    /// Create a comment. The returned comment carries the server-assigned id.
    async fn add_comment(
        &self,
        post_id: &PostId,
        text: &str,
        parent_id: Option<&CommentId>,
    ) -> Result<Comment, ApiError>;

    async fn delete_comment(&self, post_id: &PostId, comment_id: &CommentId)
        -> Result<(), ApiError>;

    async fn report(&self, post_id: &PostId, reason: &str) -> Result<(), ApiError>;
}
