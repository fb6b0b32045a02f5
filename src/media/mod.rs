//! Video viewability and playback.
//!
//! - [`ViewabilityTracker`] - picks the single active item from coverage reports
//! - [`PlaybackController`] - per-item play/pause/mute/loop state machine
//! - [`PlaybackDeck`] - routes active-index changes to the mounted controllers
//! - [`TapDisambiguator`] - single tap (mute) versus double tap (like)
//!
//! The platform player and connectivity probe sit behind the
//! [`MediaPlayer`] and [`NetworkProbe`] traits.

mod deck;
mod gesture;
pub(crate) mod playback;
mod viewability;

pub use deck::PlaybackDeck;
pub use gesture::{DoubleTapPolicy, TapAction, TapDisambiguator, DOUBLE_TAP_WINDOW};
pub use playback::{
    ManualProbe, MediaPlayer, MuteControl, NetworkClass, NetworkProbe, PlaybackController,
    PlaybackMode, PlaybackPolicy, PlaybackState, SharedMute,
};
pub use viewability::{ActiveChange, Coverage, ViewabilityTracker};
