use crate::config::Config;
use tokio::sync::watch;

/// Visible fraction of one rendered item, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    pub index: usize,
    pub percent: f32,
}

impl Coverage {
    pub fn new(index: usize, percent: f32) -> Self {
        Self { index, percent }
    }

    fn normalized(&self) -> f32 {
        if self.percent.is_nan() {
            0.0
        } else {
            self.percent.clamp(0.0, 100.0)
        }
    }
}

/// Transition of the active index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveChange {
    pub previous: Option<usize>,
    pub current: Option<usize>,
}

/// Resolves which rendered item is active from coverage reports.
///
/// The first reported item at or above the threshold wins. When nothing
/// meets the threshold the active index is kept, unless `clear_on_gap` is
/// set, in which case it drops to `None`. Changes are published on a watch
/// channel and returned from [`report`](Self::report); an unchanged index
/// produces nothing.
#[derive(Debug)]
pub struct ViewabilityTracker {
    threshold: f32,
    clear_on_gap: bool,
    active: Option<usize>,
    changes: watch::Sender<Option<usize>>,
}

impl ViewabilityTracker {
    pub fn new(threshold_percent: f32, clear_on_gap: bool) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            threshold: Coverage::new(0, threshold_percent).normalized(),
            clear_on_gap,
            active: None,
            changes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.viewability_threshold, config.clear_active_on_gap)
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Receiver that observes every active index transition.
    pub fn subscribe(&self) -> watch::Receiver<Option<usize>> {
        self.changes.subscribe()
    }

    pub fn report(&mut self, items: &[Coverage]) -> Option<ActiveChange> {
        let candidate = items
            .iter()
            .find(|c| c.normalized() >= self.threshold)
            .map(|c| c.index);

        let resolved = match candidate {
            Some(index) => Some(index),
            None if self.clear_on_gap => None,
            None => self.active,
        };
        self.transition(resolved)
    }

    /// Forget the active item, e.g. after the list was replaced.
    pub fn reset(&mut self) -> Option<ActiveChange> {
        self.transition(None)
    }

    fn transition(&mut self, resolved: Option<usize>) -> Option<ActiveChange> {
        if resolved == self.active {
            return None;
        }
        let change = ActiveChange {
            previous: self.active,
            current: resolved,
        };
        self.active = resolved;
        self.changes.send_replace(resolved);
        tracing::debug!(
            previous = ?change.previous,
            current = ?change.current,
            "Active item changed"
        );
        Some(change)
    }
}
