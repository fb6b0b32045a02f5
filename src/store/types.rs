use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Stable backend identifier of a post. Never changes once assigned.
    PostId
);
string_id!(
    /// Stable backend identifier of a comment.
    CommentId
);
string_id!(
    /// Backend identifier of a user account.
    UserId
);

// ============================================================================
// Entities
// ============================================================================

/// Kind of media attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Reference to a media asset hosted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

/// A post as held by the feed store.
///
/// Counters are unsigned: a negative count cannot be represented, and every
/// write path goes through [`PostPatch`] which clamps at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub user_has_liked: bool,
}

impl Post {
    pub fn has_video(&self) -> bool {
        matches!(
            self.media,
            Some(MediaRef {
                kind: MediaKind::Video,
                ..
            })
        )
    }

    pub fn like_state(&self) -> LikeState {
        LikeState {
            user_has_liked: self.user_has_liked,
            likes_count: self.likes_count,
        }
    }
}

/// A comment on a post. `parent_id` is `None` for top-level comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// The pair of fields a like toggle touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub user_has_liked: bool,
    pub likes_count: u64,
}

/// Partial update applied through `FeedStore::set`.
///
/// Counts are signed so callers can express a decrement result directly;
/// the store clamps anything below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub likes_count: Option<i64>,
    pub comments_count: Option<i64>,
    pub user_has_liked: Option<bool>,
}

impl PostPatch {
    pub fn like_state(state: LikeState) -> Self {
        Self {
            likes_count: Some(state.likes_count.min(i64::MAX as u64) as i64),
            user_has_liked: Some(state.user_has_liked),
            comments_count: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.likes_count.is_none() && self.comments_count.is_none() && self.user_has_liked.is_none()
    }
}

/// Convert a possibly negative count to the stored representation.
pub(crate) fn clamp_count(value: i64) -> u64 {
    value.max(0) as u64
}

// ============================================================================
// Viewer Identity
// ============================================================================

/// The signed-in user as reported by the session provider.
///
/// Ownership answers are a display hint (e.g. whether to show a delete
/// button). The backend verifies ownership on every privileged request;
/// nothing in this crate gates a request on these checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: Option<UserId>,
}

impl Viewer {
    pub fn new(user_id: Option<UserId>) -> Self {
        Self { user_id }
    }

    pub fn can_delete(&self, comment: &Comment) -> bool {
        self.user_id.as_ref() == Some(&comment.author_id)
    }

    pub fn owns_post(&self, post: &Post) -> bool {
        self.user_id.as_ref() == Some(&post.author_id)
    }
}
