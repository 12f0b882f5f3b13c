//! Player state shared with consumers
//!
//! Writers go through `SharedPlayerState::update`, which publishes every
//! change to `watch` subscribers. Readers either take a snapshot or
//! subscribe.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::database::Track;

/// Coordinator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerStatus {
    /// No track bound
    #[default]
    Idle,
    /// A play request is resolving or opening its source
    Loading,
    Playing,
    /// Paused by request or at natural end of track
    Paused,
}

/// Everything the presentation layer may observe
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub status: PlayerStatus,
    pub current_track: Option<Track>,
    pub position_ms: u64,
    pub duration_ms: u64,
    /// Progress of the most recent download, 0.0 when idle
    pub download_progress: f32,
}

impl PlayerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.status == PlayerStatus::Playing
    }

    pub fn is_loading(&self) -> bool {
        self.status == PlayerStatus::Loading
    }

    /// Back to `Idle`, keeping only the download progress
    pub(super) fn clear_session(&mut self) {
        self.status = PlayerStatus::Idle;
        self.current_track = None;
        self.position_ms = 0;
        self.duration_ms = 0;
    }
}

/// Thread-safe player state with change notification
#[derive(Debug, Clone)]
pub struct SharedPlayerState {
    inner: Arc<RwLock<PlayerSnapshot>>,
    tx: Arc<watch::Sender<PlayerSnapshot>>,
}

impl Default for SharedPlayerState {
    fn default() -> Self {
        let (tx, _) = watch::channel(PlayerSnapshot::default());
        Self {
            inner: Arc::new(RwLock::new(PlayerSnapshot::default())),
            tx: Arc::new(tx),
        }
    }
}

impl SharedPlayerState {
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.inner.read().clone()
    }

    pub fn status(&self) -> PlayerStatus {
        self.inner.read().status
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.tx.subscribe()
    }

    /// Apply a change and publish it if anything differs
    pub(super) fn update(&self, f: impl FnOnce(&mut PlayerSnapshot)) {
        let mut state = self.inner.write();
        let before = state.clone();
        f(&mut state);
        if *state != before {
            self.tx.send_replace(state.clone());
        }
    }
}
