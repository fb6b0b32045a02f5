use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

/// Default gap under which two taps form a double tap.
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(280);

/// What a double tap does to a post the viewer already likes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleTapPolicy {
    /// Same as the like button: a liked post is un-liked.
    #[default]
    Toggle,
    /// Only ever likes; a double tap on a liked post does nothing.
    LikeOnly,
}

impl DoubleTapPolicy {
    /// Whether a double tap should send a like toggle for a post in this state.
    pub fn sends_toggle(self, user_has_liked: bool) -> bool {
        match self {
            DoubleTapPolicy::Toggle => true,
            DoubleTapPolicy::LikeOnly => !user_has_liked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    Like,
    ToggleMute,
}

/// Classifies taps on one media surface as single or double.
///
/// A tap opens a window. A second tap inside it yields [`TapAction::Like`]
/// and cancels the single tap. Once the window has passed with no second
/// tap, [`poll`](Self::poll) yields [`TapAction::ToggleMute`]. Time is
/// passed in so the caller's tick drives expiry.
#[derive(Debug, Clone)]
pub struct TapDisambiguator {
    window: Duration,
    pending: Option<Instant>,
}

impl Default for TapDisambiguator {
    fn default() -> Self {
        Self::new(DOUBLE_TAP_WINDOW)
    }
}

impl TapDisambiguator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending single tap fires, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|tap| tap + self.window)
    }

    pub fn on_tap(&mut self, now: Instant) -> Option<TapAction> {
        match self.pending.take() {
            Some(previous) if now.saturating_duration_since(previous) < self.window => {
                Some(TapAction::Like)
            }
            // Window already over but not yet polled: the earlier tap was
            // a single tap, and this one starts a new window.
            Some(_) => {
                self.pending = Some(now);
                Some(TapAction::ToggleMute)
            }
            None => {
                self.pending = Some(now);
                None
            }
        }
    }

    pub fn poll(&mut self, now: Instant) -> Option<TapAction> {
        let previous = self.pending?;
        if now.saturating_duration_since(previous) >= self.window {
            self.pending = None;
            Some(TapAction::ToggleMute)
        } else {
            None
        }
    }
}
