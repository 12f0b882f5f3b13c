//! Audio playback module
//!
//! - `PlaybackEngine`: the transport the player coordinator drives
//! - `RodioEngine`: rodio implementation running on a dedicated audio thread
//! - `output`: output device selection

mod handle;
mod output;
mod thread;

use std::path::PathBuf;

use async_trait::async_trait;

pub use handle::RodioEngine;
pub use output::list_output_devices;

/// Where audio for a session comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Downloaded file on disk
    Local(PathBuf),
    /// Remote URL, fetched before decoding
    Remote(String),
}

impl std::fmt::Display for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioSource::Local(path) => write!(f, "{}", path.display()),
            AudioSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Snapshot of the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub position_ms: u64,
    /// 0 when the decoder cannot tell
    pub duration_ms: u64,
    pub is_playing: bool,
    /// Raised once per natural end of track
    pub did_just_finish: bool,
}

/// Audio output transport
///
/// Holds at most one session. Loading replaces the previous session.
/// Transport commands without a session do nothing.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Open a source, unloading any previous session first
    async fn load(&self, source: AudioSource, autoplay: bool) -> Result<(), String>;

    async fn pause(&self);

    async fn resume(&self);

    /// Release the session
    async fn stop(&self);

    async fn seek(&self, position_ms: u64);

    /// Current status; at natural end the session rewinds to 0, paused
    async fn status(&self) -> EngineStatus;
}
