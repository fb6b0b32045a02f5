//! Feed synchronization engine.
//!
//! This module keeps the local [`FeedStore`](crate::store::FeedStore)
//! consistent with the backend while the user acts faster than the network
//! confirms:
//!
//! - [`Paginator`] - single-flight page fetching (refresh replaces, load-more appends)
//! - [`MutationCoordinator`] - optimistic like toggles, confirmed-only comment writes
//! - [`LikeMutation`] - a speculative toggle carrying its own undo snapshot
//!
//! # Architecture
//!
//! Controllers never await the network while holding the store. A request
//! is spawned as a background task and its result comes back as a
//! [`SyncEvent`] on an mpsc channel; the owner of the store (see
//! [`FeedSession`](crate::session::FeedSession)) feeds each event to the
//! matching `on_*` handler. Guards are set when a request is spawned and
//! released only by its event, so a second request for the same key is
//! ignored until the first resolves.

mod coordinator;
mod mutation;
mod pagination;

pub use coordinator::MutationCoordinator;
pub use mutation::{LikeMutation, MutationStatus};
pub use pagination::{PageOutcome, Paginator};

use crate::api::{ApiError, Page, ReactionResult};
use crate::store::{Comment, CommentId, MergeMode, PostId};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity of the event channel between request tasks and the store owner.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Completion of a spawned backend request.
#[derive(Debug)]
pub enum SyncEvent {
    PageLoaded {
        generation: u64,
        mode: MergeMode,
        result: Result<Page, ApiError>,
    },
    CommentsLoaded {
        post_id: PostId,
        result: Result<Vec<Comment>, ApiError>,
    },
    LikeSettled {
        post_id: PostId,
        result: Result<ReactionResult, ApiError>,
    },
    CommentAdded {
        post_id: PostId,
        result: Result<Comment, ApiError>,
    },
    CommentDeleted {
        post_id: PostId,
        comment_id: CommentId,
        result: Result<(), ApiError>,
    },
    Reported {
        post_id: PostId,
        result: Result<(), ApiError>,
    },
}

/// User-facing operations exposed by the action API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Refresh,
    LoadMore,
    LoadComments,
    Like,
    AddComment,
    DeleteComment,
    Report,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Refresh => "Refresh",
            Operation::LoadMore => "Loading more posts",
            Operation::LoadComments => "Loading comments",
            Operation::Like => "Like",
            Operation::AddComment => "Comment",
            Operation::DeleteComment => "Delete",
            Operation::Report => "Report",
        };
        f.write_str(name)
    }
}

/// Failed outcome of an operation, already stripped of transport detail.
///
/// `reason` is safe to show the user: the backend's own text for a
/// rejection, a generic line for network trouble.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {reason}")]
pub struct SyncError {
    pub operation: Operation,
    pub reason: String,
    pub transient: bool,
}

impl SyncError {
    pub(crate) fn from_api(operation: Operation, err: &ApiError) -> Self {
        Self {
            operation,
            reason: err.user_message(),
            transient: err.is_transient(),
        }
    }
}

/// Result of asking a controller to start an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A request was spawned; its outcome arrives as a [`SyncEvent`].
    Sent,
    /// Nothing was sent and nothing changed locally.
    Ignored(IgnoreReason),
}

impl Dispatch {
    pub fn is_sent(&self) -> bool {
        matches!(self, Dispatch::Sent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Same operation already in flight for this key.
    AlreadyPending,
    /// The post is not in the store.
    UnknownPost,
    /// Blank comment text or report reason.
    EmptyText,
    /// No further pages.
    Exhausted,
    /// A previous page fetch failed; only a refresh resumes paging.
    Halted,
    /// Double tap on a liked post with the like-only policy.
    AlreadyLiked,
}

/// Run a request future in a background task and deliver its result.
///
/// A panic inside the request is converted into `ApiError::Internal` so the
/// matching event is still sent and the caller's guard is released.
pub(crate) fn spawn_request<T, Fut, E>(
    tx: &mpsc::Sender<SyncEvent>,
    task: &'static str,
    request: Fut,
    into_event: E,
) where
    T: Send + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    E: FnOnce(Result<T, ApiError>) -> SyncEvent + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = match catch_task_panic(request).await {
            Ok(result) => result,
            Err(panic_msg) => {
                tracing::error!(task, error = %panic_msg, "Background request panicked");
                Err(ApiError::Internal(panic_msg))
            }
        };
        if let Err(e) = tx.send(into_event(result)).await {
            tracing::warn!(task, error = %e, "Channel send failed (receiver dropped)");
        }
    });
}

/// Await a future, turning a panic into its message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}
