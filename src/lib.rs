//! Client-side feed synchronization.
//!
//! Keeps a local, ordered set of posts and comment threads consistent with
//! the backend while the user likes, comments and scrolls faster than the
//! network confirms, and decides which video in a list may play.
//!
//! - [`store`] - posts, comment threads and the entity-level store API
//! - [`api`] - backend trait and its HTTP implementation
//! - [`sync`] - pagination and optimistic/confirmed mutations
//! - [`media`] - viewability, playback and tap gestures
//! - [`session`] - owner of the store that applies request results
//! - [`config`] - TOML configuration

pub mod api;
pub mod config;
pub mod media;
pub mod session;
pub mod store;
pub mod sync;

pub use config::Config;
pub use session::{FeedSession, SessionOptions};
