use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Connectivity class as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkClass {
    /// WiFi or ethernet.
    Unmetered,
    /// Cellular.
    Metered,
    Offline,
    #[default]
    Unknown,
}

impl NetworkClass {
    /// Whether inline video may start without a tap.
    pub fn allows_autoplay(self, autoplay_on_metered: bool) -> bool {
        match self {
            NetworkClass::Unmetered => true,
            NetworkClass::Metered => autoplay_on_metered,
            NetworkClass::Offline | NetworkClass::Unknown => false,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            NetworkClass::Unmetered => 0,
            NetworkClass::Metered => 1,
            NetworkClass::Offline => 2,
            NetworkClass::Unknown => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => NetworkClass::Unmetered,
            1 => NetworkClass::Metered,
            2 => NetworkClass::Offline,
            _ => NetworkClass::Unknown,
        }
    }
}

/// Source of the current connectivity class.
pub trait NetworkProbe: Send + Sync {
    fn current(&self) -> NetworkClass;
}

/// Probe whose value is pushed by the host, e.g. from an OS callback.
#[derive(Debug)]
pub struct ManualProbe(AtomicU8);

impl Default for ManualProbe {
    fn default() -> Self {
        Self::new(NetworkClass::Unknown)
    }
}

impl ManualProbe {
    pub fn new(class: NetworkClass) -> Self {
        Self(AtomicU8::new(class.to_u8()))
    }

    pub fn set(&self, class: NetworkClass) {
        self.0.store(class.to_u8(), Ordering::Relaxed);
    }
}

impl NetworkProbe for ManualProbe {
    fn current(&self) -> NetworkClass {
        NetworkClass::from_u8(self.0.load(Ordering::Relaxed))
    }
}

/// Playback primitives of the platform video player.
///
/// Callbacks from the player (progress, buffering, finish, error) are fed
/// back through the `on_*` methods of [`PlaybackController`].
pub trait MediaPlayer: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration);
    fn set_muted(&mut self, muted: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Video embedded in the scrolling feed; autoplay is network-gated.
    Inline,
    /// Full-screen reel; plays whenever active.
    Immersive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPolicy {
    pub autoplay_on_metered: bool,
    /// Restart from zero at end of clip instead of stopping.
    pub looping: bool,
}

impl PlaybackPolicy {
    pub fn inline() -> Self {
        Self {
            autoplay_on_metered: false,
            looping: false,
        }
    }

    pub fn immersive() -> Self {
        Self {
            autoplay_on_metered: false,
            looping: true,
        }
    }
}

/// One mute flag broadcast to every item that holds a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedMute(Arc<AtomicBool>);

impl SharedMute {
    pub fn new(muted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(muted)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, muted: bool) {
        self.0.store(muted, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
pub enum MuteControl {
    PerItem(bool),
    Shared(SharedMute),
}

impl MuteControl {
    fn get(&self) -> bool {
        match self {
            MuteControl::PerItem(muted) => *muted,
            MuteControl::Shared(shared) => shared.get(),
        }
    }

    fn set(&mut self, muted: bool) {
        match self {
            MuteControl::PerItem(flag) => *flag = muted,
            MuteControl::Shared(shared) => shared.set(muted),
        }
    }
}

/// Snapshot of one item's playback state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub is_active: bool,
    /// Paused by a held press.
    pub is_paused: bool,
    pub is_muted: bool,
    pub is_playing: bool,
    pub should_play: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub is_buffering: bool,
    pub error: Option<String>,
}

/// Playback state machine for a single video item.
pub struct PlaybackController {
    player: Box<dyn MediaPlayer>,
    mode: PlaybackMode,
    policy: PlaybackPolicy,
    mute: MuteControl,
    applied_mute: bool,
    network: NetworkClass,
    active: bool,
    held: bool,
    should_play: bool,
    playing: bool,
    position: Duration,
    duration: Option<Duration>,
    buffering: bool,
    error: Option<String>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    pub fn new(
        mut player: Box<dyn MediaPlayer>,
        mode: PlaybackMode,
        policy: PlaybackPolicy,
        mute: MuteControl,
    ) -> Self {
        let applied_mute = mute.get();
        player.set_muted(applied_mute);
        Self {
            player,
            mode,
            policy,
            mute,
            applied_mute,
            network: NetworkClass::Unknown,
            active: false,
            held: false,
            should_play: false,
            playing: false,
            position: Duration::ZERO,
            duration: None,
            buffering: false,
            error: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            is_active: self.active,
            is_paused: self.held,
            is_muted: self.mute.get(),
            is_playing: self.playing,
            should_play: self.should_play,
            position: self.position,
            duration: self.duration,
            is_buffering: self.buffering,
            error: self.error.clone(),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.mute.get()
    }

    fn may_start(&self) -> bool {
        match self.mode {
            PlaybackMode::Immersive => true,
            PlaybackMode::Inline => self.network.allows_autoplay(self.policy.autoplay_on_metered),
        }
    }

    fn resume(&mut self) {
        if self.active && self.should_play && !self.held && !self.playing && self.error.is_none() {
            self.player.play();
            self.playing = true;
        }
    }

    fn halt(&mut self) {
        if self.playing {
            self.player.pause();
            self.playing = false;
        }
    }

    /// Update activeness. Gaining it may autostart; losing it pauses and
    /// forgets the play intent.
    pub fn set_active(&mut self, active: bool, network: NetworkClass) {
        self.network = network;
        if active == self.active {
            return;
        }
        self.active = active;
        if active {
            self.should_play = self.may_start();
            self.resume();
        } else {
            self.should_play = false;
            self.held = false;
            self.halt();
        }
    }

    /// Connectivity changed. An active inline item that was waiting for an
    /// unmetered network starts now; one already playing keeps playing.
    pub fn set_network(&mut self, network: NetworkClass) {
        self.network = network;
        if self.active && !self.should_play && self.may_start() {
            self.should_play = true;
            self.resume();
        }
    }

    /// Explicit play tap. Starts the active item regardless of network and
    /// retries an item whose media failed.
    pub fn request_play(&mut self) -> bool {
        if !self.active {
            return false;
        }
        if self.error.take().is_some() {
            tracing::debug!("Retrying failed media after tap");
        }
        self.should_play = true;
        self.resume();
        self.playing
    }

    pub fn press_in(&mut self) {
        self.held = true;
        self.halt();
    }

    /// Release a hold. Resumes only when the item is still active.
    pub fn press_out(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        self.resume();
    }

    pub fn on_progress(&mut self, position: Duration, duration: Option<Duration>) {
        self.position = position;
        if duration.is_some() {
            self.duration = duration;
        }
    }

    pub fn on_buffering(&mut self, buffering: bool) {
        self.buffering = buffering;
    }

    /// End of clip: rewind, then loop or stop.
    pub fn on_finish(&mut self) {
        self.player.seek(Duration::ZERO);
        self.position = Duration::ZERO;
        if self.policy.looping {
            if self.playing {
                self.player.play();
            }
        } else {
            self.playing = false;
            self.should_play = false;
        }
    }

    /// The player failed to load or play this item. Only this item stops.
    pub fn on_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(error = %message, "Media playback failed");
        self.error = Some(message);
        self.halt();
        self.should_play = false;
        self.buffering = false;
    }

    pub fn mute(&mut self) {
        self.set_muted(true);
    }

    pub fn unmute(&mut self) {
        self.set_muted(false);
    }

    pub fn toggle_mute(&mut self) -> bool {
        let muted = !self.mute.get();
        self.set_muted(muted);
        muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.mute.set(muted);
        self.sync_mute();
    }

    /// Push the current mute flag to the player if it changed, e.g. after
    /// another item flipped a shared flag.
    pub fn sync_mute(&mut self) {
        let muted = self.mute.get();
        if muted != self.applied_mute {
            self.player.set_muted(muted);
            self.applied_mute = muted;
        }
    }
}
