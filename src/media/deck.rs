use super::playback::{
    MediaPlayer, MuteControl, NetworkClass, NetworkProbe, PlaybackController, PlaybackMode,
    PlaybackPolicy, PlaybackState, SharedMute,
};
use super::viewability::ActiveChange;
use crate::config::Config;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// The playback controllers of one rendered list, keyed by item index.
///
/// Active-index transitions from the viewability tracker are routed here so
/// exactly the active item may play. Player callbacks are addressed by
/// index; a failure on one item never reaches another.
pub struct PlaybackDeck {
    mode: PlaybackMode,
    policy: PlaybackPolicy,
    shared_mute: Option<SharedMute>,
    probe: Arc<dyn NetworkProbe>,
    items: BTreeMap<usize, PlaybackController>,
    active: Option<usize>,
}

impl PlaybackDeck {
    pub fn new(
        mode: PlaybackMode,
        policy: PlaybackPolicy,
        shared_mute: Option<SharedMute>,
        probe: Arc<dyn NetworkProbe>,
    ) -> Self {
        Self {
            mode,
            policy,
            shared_mute,
            probe,
            items: BTreeMap::new(),
            active: None,
        }
    }

    pub fn from_config(mode: PlaybackMode, config: &Config, probe: Arc<dyn NetworkProbe>) -> Self {
        let policy = PlaybackPolicy {
            autoplay_on_metered: config.autoplay_on_metered,
            looping: mode == PlaybackMode::Immersive && config.loop_reels,
        };
        let shared_mute = config.shared_mute.then(SharedMute::default);
        Self::new(mode, policy, shared_mute, probe)
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<PlaybackState> {
        self.items.get(&index).map(PlaybackController::state)
    }

    /// Attach a player for a newly rendered video item. A player already
    /// mounted at the index is replaced.
    pub fn mount(&mut self, index: usize, player: Box<dyn MediaPlayer>) {
        let mute = match &self.shared_mute {
            Some(shared) => MuteControl::Shared(shared.clone()),
            None => MuteControl::PerItem(false),
        };
        let mut controller = PlaybackController::new(player, self.mode, self.policy, mute);
        if self.active == Some(index) {
            controller.set_active(true, self.probe.current());
        }
        self.items.insert(index, controller);
    }

    pub fn unmount(&mut self, index: usize) {
        if let Some(mut controller) = self.items.remove(&index) {
            controller.set_active(false, self.probe.current());
        }
    }

    /// Detach every player, e.g. when the list is replaced.
    pub fn clear(&mut self) {
        let network = self.probe.current();
        for controller in self.items.values_mut() {
            controller.set_active(false, network);
        }
        self.items.clear();
        self.active = None;
    }

    pub fn apply_active(&mut self, change: ActiveChange) {
        self.set_active_index(change.current);
    }

    pub fn set_active_index(&mut self, index: Option<usize>) {
        if index == self.active {
            return;
        }
        let network = self.probe.current();
        if let Some(previous) = self.active.and_then(|i| self.items.get_mut(&i)) {
            previous.set_active(false, network);
        }
        if let Some(current) = index.and_then(|i| self.items.get_mut(&i)) {
            current.set_active(true, network);
        }
        self.active = index;
    }

    /// Re-read the probe after a connectivity change.
    pub fn network_changed(&mut self) -> NetworkClass {
        let network = self.probe.current();
        for controller in self.items.values_mut() {
            controller.set_network(network);
        }
        network
    }

    fn with_item<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut PlaybackController) -> R,
    ) -> Option<R> {
        match self.items.get_mut(&index) {
            Some(controller) => Some(f(controller)),
            None => {
                tracing::debug!(index, "No player mounted at index");
                None
            }
        }
    }

    pub fn request_play(&mut self, index: usize) -> bool {
        self.with_item(index, PlaybackController::request_play)
            .unwrap_or(false)
    }

    pub fn press_in(&mut self, index: usize) {
        self.with_item(index, PlaybackController::press_in);
    }

    pub fn press_out(&mut self, index: usize) {
        self.with_item(index, PlaybackController::press_out);
    }

    pub fn on_progress(&mut self, index: usize, position: Duration, duration: Option<Duration>) {
        self.with_item(index, |c| c.on_progress(position, duration));
    }

    pub fn on_buffering(&mut self, index: usize, buffering: bool) {
        self.with_item(index, |c| c.on_buffering(buffering));
    }

    pub fn on_finish(&mut self, index: usize) {
        self.with_item(index, PlaybackController::on_finish);
    }

    pub fn on_error(&mut self, index: usize, message: &str) {
        tracing::warn!(index, error = %message, "Media failed for item");
        self.with_item(index, |c| c.on_error(message));
    }

    /// Flip mute for the item at `index`. With a shared flag every mounted
    /// player follows. Returns the new mute state.
    pub fn toggle_mute(&mut self, index: usize) -> Option<bool> {
        let muted = self.with_item(index, PlaybackController::toggle_mute)?;
        if self.shared_mute.is_some() {
            for controller in self.items.values_mut() {
                controller.sync_mute();
            }
        }
        Some(muted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::playback::testing::RecordingPlayer;
    use crate::media::playback::ManualProbe;
    use crate::media::{Coverage, ViewabilityTracker};
    use pretty_assertions::assert_eq;

    fn deck(
        mode: PlaybackMode,
        shared: bool,
        network: NetworkClass,
    ) -> (PlaybackDeck, Arc<ManualProbe>, Vec<RecordingPlayer>) {
        let probe = Arc::new(ManualProbe::new(network));
        let policy = match mode {
            PlaybackMode::Inline => PlaybackPolicy::inline(),
            PlaybackMode::Immersive => PlaybackPolicy::immersive(),
        };
        let mut deck = PlaybackDeck::new(
            mode,
            policy,
            shared.then(SharedMute::default),
            probe.clone(),
        );
        let players: Vec<RecordingPlayer> = (0..3).map(|_| RecordingPlayer::default()).collect();
        for (i, p) in players.iter().enumerate() {
            deck.mount(i, Box::new(p.clone()));
            p.clear();
        }
        (deck, probe, players)
    }

    #[test]
    fn test_only_active_item_plays_as_list_scrolls() {
        let (mut deck, _, players) = deck(PlaybackMode::Immersive, false, NetworkClass::Metered);
        let mut tracker = ViewabilityTracker::new(80.0, false);

        for report in [[100.0, 0.0], [30.0, 70.0], [0.0, 95.0]] {
            let coverage: Vec<Coverage> = report
                .iter()
                .enumerate()
                .map(|(i, p)| Coverage::new(i, *p))
                .collect();
            if let Some(change) = tracker.report(&coverage) {
                deck.apply_active(change);
            }
        }

        assert_eq!(players[0].calls(), vec!["play", "pause"]);
        assert_eq!(players[1].calls(), vec!["play"]);
        assert!(players[2].calls().is_empty());
        assert_eq!(deck.active(), Some(1));
    }

    #[test]
    fn test_inline_deck_waits_for_wifi() {
        let (mut deck, probe, players) = deck(PlaybackMode::Inline, false, NetworkClass::Metered);
        deck.set_active_index(Some(0));
        assert!(players[0].calls().is_empty());

        probe.set(NetworkClass::Unmetered);
        assert_eq!(deck.network_changed(), NetworkClass::Unmetered);
        assert_eq!(players[0].calls(), vec!["play"]);
        // Inactive items stay idle
        assert!(players[1].calls().is_empty());
    }

    #[test]
    fn test_media_error_isolated_to_item() {
        let (mut deck, _, players) = deck(PlaybackMode::Immersive, false, NetworkClass::Unmetered);
        deck.set_active_index(Some(0));
        deck.on_error(0, "404");
        deck.set_active_index(Some(1));

        assert_eq!(deck.state(0).unwrap().error.as_deref(), Some("404"));
        assert!(deck.state(1).unwrap().is_playing);
        assert!(deck.state(1).unwrap().error.is_none());
        assert_eq!(players[1].calls(), vec!["play"]);
    }

    #[test]
    fn test_per_item_mute_variant() {
        let (mut deck, _, players) = deck(PlaybackMode::Immersive, false, NetworkClass::Unmetered);
        assert_eq!(deck.toggle_mute(1), Some(true));
        assert!(!deck.state(0).unwrap().is_muted);
        assert!(players[0].calls().is_empty());
        assert_eq!(players[1].calls(), vec!["muted:true"]);
    }

    #[test]
    fn test_shared_mute_variant_broadcasts() {
        let (mut deck, _, players) = deck(PlaybackMode::Immersive, true, NetworkClass::Unmetered);
        assert_eq!(deck.toggle_mute(1), Some(true));
        for (i, p) in players.iter().enumerate() {
            assert!(deck.state(i).unwrap().is_muted);
            assert_eq!(p.calls(), vec!["muted:true"]);
        }

        // Late mount picks up the shared value
        let late = RecordingPlayer::default();
        deck.mount(7, Box::new(late.clone()));
        assert_eq!(late.calls(), vec!["muted:true"]);
    }

    #[test]
    fn test_mount_at_active_index_starts_playing() {
        let (mut deck, _, _) = deck(PlaybackMode::Immersive, false, NetworkClass::Unmetered);
        deck.set_active_index(Some(5));
        let late = RecordingPlayer::default();
        deck.mount(5, Box::new(late.clone()));
        assert!(late.calls().contains(&"play".to_string()));
    }

    #[test]
    fn test_unknown_index_is_ignored() {
        let (mut deck, _, _) = deck(PlaybackMode::Inline, false, NetworkClass::Unmetered);
        assert_eq!(deck.toggle_mute(42), None);
        assert!(!deck.request_play(42));
        deck.on_error(42, "gone");
    }

    #[test]
    fn test_from_config_uses_loop_and_mute_settings() {
        let config = Config {
            shared_mute: true,
            loop_reels: false,
            ..Config::default()
        };
        let probe: Arc<dyn NetworkProbe> = Arc::new(ManualProbe::new(NetworkClass::Unmetered));
        let mut deck = PlaybackDeck::from_config(PlaybackMode::Immersive, &config, probe);
        let player = RecordingPlayer::default();
        deck.mount(0, Box::new(player.clone()));
        deck.set_active_index(Some(0));
        deck.on_finish(0);

        let state = deck.state(0).unwrap();
        assert!(!state.is_playing);
        assert_eq!(state.position, Duration::ZERO);
    }
}
