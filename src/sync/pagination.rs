use super::{spawn_request, Dispatch, IgnoreReason, Operation, SyncError, SyncEvent};
use crate::api::{ApiError, FeedApi, Page};
use crate::store::{FeedStore, MergeMode};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What happened when a page result was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Applied { added: usize, has_more: bool },
    /// The result belongs to a request that was superseded; it was dropped.
    Stale,
    Failed(SyncError),
}

/// Cursor-based page fetching with a single request in flight.
///
/// Every request carries a generation number. A refresh bumps the generation
/// and supersedes an in-flight load-more, whose late result is then dropped
/// as stale. A failed fetch halts load-more until a refresh succeeds; the
/// store is never cleared by a failure.
pub struct Paginator {
    api: Arc<dyn FeedApi>,
    tx: mpsc::Sender<SyncEvent>,
    page_size: usize,
    cursor: Option<String>,
    has_more: bool,
    halted: bool,
    generation: u64,
    in_flight: Option<(u64, MergeMode)>,
}

impl Paginator {
    pub fn new(api: Arc<dyn FeedApi>, tx: mpsc::Sender<SyncEvent>, page_size: usize) -> Self {
        Self {
            api,
            tx,
            page_size: page_size.max(1),
            cursor: None,
            has_more: true,
            halted: false,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.in_flight, Some((_, MergeMode::Replace)))
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Fetch the first page. The result replaces the store's contents.
    pub fn refresh(&mut self) -> Dispatch {
        if self.is_refreshing() {
            tracing::debug!("Refresh already in flight, ignoring");
            return Dispatch::Ignored(IgnoreReason::AlreadyPending);
        }
        if let Some((superseded, _)) = self.in_flight {
            tracing::debug!(generation = superseded, "Refresh supersedes load-more");
        }
        self.start(MergeMode::Replace, None);
        Dispatch::Sent
    }

    /// Fetch the page after the current cursor. The result is appended.
    pub fn load_more(&mut self) -> Dispatch {
        if self.in_flight.is_some() {
            return Dispatch::Ignored(IgnoreReason::AlreadyPending);
        }
        if self.halted {
            tracing::debug!("Load-more halted after a failure, waiting for refresh");
            return Dispatch::Ignored(IgnoreReason::Halted);
        }
        if !self.has_more {
            return Dispatch::Ignored(IgnoreReason::Exhausted);
        }
        let cursor = self.cursor.clone();
        self.start(MergeMode::Append, cursor);
        Dispatch::Sent
    }

    fn start(&mut self, mode: MergeMode, cursor: Option<String>) {
        self.generation += 1;
        let generation = self.generation;
        self.in_flight = Some((generation, mode));
        tracing::debug!(generation, ?mode, cursor = ?cursor, "Fetching page");

        let api = Arc::clone(&self.api);
        let limit = self.page_size;
        spawn_request(
            &self.tx,
            "fetch_page",
            async move { api.fetch_page(cursor.as_deref(), limit).await },
            move |result| SyncEvent::PageLoaded {
                generation,
                mode,
                result,
            },
        );
    }

    /// Apply a delivered page to the store.
    pub fn on_page_loaded(
        &mut self,
        store: &mut FeedStore,
        generation: u64,
        mode: MergeMode,
        result: Result<Page, ApiError>,
    ) -> PageOutcome {
        if self.in_flight != Some((generation, mode)) {
            tracing::debug!(generation, current = self.generation, "Dropping stale page");
            return PageOutcome::Stale;
        }
        self.in_flight = None;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.halted = true;
                let operation = match mode {
                    MergeMode::Replace => Operation::Refresh,
                    MergeMode::Append => Operation::LoadMore,
                };
                tracing::warn!(generation, ?mode, error = %e, "Page fetch failed");
                return PageOutcome::Failed(SyncError::from_api(operation, &e));
            }
        };

        let received = page.items.len();
        let added = store.merge(page.items, mode);
        if mode == MergeMode::Replace {
            self.halted = false;
        }

        if page.has_more && page.next_cursor.is_none() {
            tracing::warn!("Backend reported more pages without a cursor, treating as end");
        }
        self.has_more = page.has_more && page.next_cursor.is_some();
        self.cursor = page.next_cursor;

        tracing::info!(
            generation,
            ?mode,
            received,
            added,
            has_more = self.has_more,
            "Page applied"
        );
        PageOutcome::Applied {
            added,
            has_more: self.has_more,
        }
    }
}
