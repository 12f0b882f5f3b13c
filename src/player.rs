//! Player coordinator
//!
//! Owns the single playback session and decides where audio comes from:
//! a downloaded file when the bound user has one on disk, the track's
//! remote URL otherwise. Transport commands are serialized against the
//! session; a background task polls the engine and republishes its state.
//!
//! ```text
//! Idle -> Loading -> Playing <-> Paused
//!           |           \         /
//!           v            `-> Idle (stop)
//!          Idle (load failure)
//! ```

mod polling;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSource, PlaybackEngine};
use crate::backend::Backend;
use crate::database::{Track, TrackId, UserId};
use crate::download::DownloadManager;
use crate::error::{PlayerError, Result};

pub use state::{PlayerSnapshot, PlayerStatus, SharedPlayerState};

struct PlayerInner {
    engine: Arc<dyn PlaybackEngine>,
    backend: Arc<dyn Backend>,
    downloads: DownloadManager,
    identity: RwLock<Option<UserId>>,
    /// Held by every operation that touches the engine session
    session: tokio::sync::Mutex<()>,
    /// Bumped by each play and stop; a play whose ticket is stale lost the race
    generation: AtomicU64,
    state: SharedPlayerState,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PlayerInner {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.lock().take() {
            poller.abort();
        }
    }
}

/// Cloneable handle to the player coordinator
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("identity", &*self.inner.identity.read())
            .field("state", &self.inner.state.snapshot())
            .finish_non_exhaustive()
    }
}

impl Player {
    /// Create the coordinator and start polling the engine
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        backend: Arc<dyn Backend>,
        downloads: DownloadManager,
        poll_interval: Duration,
    ) -> Self {
        let inner = Arc::new(PlayerInner {
            engine,
            backend,
            downloads,
            identity: RwLock::new(None),
            session: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            state: SharedPlayerState::default(),
            poller: Mutex::new(None),
        });

        let poller = polling::spawn_status_poller(Arc::downgrade(&inner), poll_interval);
        *inner.poller.lock() = Some(poller);

        Self { inner }
    }

    // ============ Identity ============

    /// Bind or clear the signed-in user
    pub fn set_identity(&self, user_id: Option<UserId>) {
        debug!("Identity set to {:?}", user_id);
        *self.inner.identity.write() = user_id;
    }

    pub fn identity(&self) -> Option<UserId> {
        self.inner.identity.read().clone()
    }

    // ============ State ============

    pub fn snapshot(&self) -> PlayerSnapshot {
        let mut snapshot = self.inner.state.snapshot();
        snapshot.download_progress = self.download_progress();
        snapshot
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn download_progress(&self) -> f32 {
        self.inner.downloads.progress().get()
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    // ============ Transport ============

    /// Play a track from the start, replacing whatever is loaded
    pub async fn play(&self, track: &Track) -> Result<()> {
        let generation = self.next_generation();
        let _session = self.inner.session.lock().await;
        if !self.is_current(generation) {
            debug!("Play of {} superseded before loading", track.id);
            return Err(PlayerError::Superseded);
        }

        self.inner.engine.stop().await;
        self.inner.state.update(|s| {
            s.clear_session();
            s.status = PlayerStatus::Loading;
        });

        let source = self.resolve_source(track).await;
        info!("Playing {} from {}", track.title, source);

        if let Err(e) = self.inner.engine.load(source, true).await {
            if !self.is_current(generation) {
                return Err(PlayerError::Superseded);
            }
            error!("Failed to load {}: {}", track.id, e);
            self.inner.state.update(|s| s.clear_session());
            return Err(PlayerError::PlaybackLoad(e));
        }

        if !self.is_current(generation) {
            debug!("Play of {} superseded while loading, unloading", track.id);
            self.inner.engine.stop().await;
            return Err(PlayerError::Superseded);
        }

        let status = self.inner.engine.status().await;
        let duration_ms = if status.duration_ms > 0 {
            status.duration_ms
        } else {
            track.nominal_duration_ms()
        };
        self.inner.state.update(|s| {
            s.status = PlayerStatus::Playing;
            s.current_track = Some(track.clone());
            s.position_ms = 0;
            s.duration_ms = duration_ms;
        });

        if self.identity().is_some() {
            self.spawn_play_count_increment(track.id.clone());
        }

        Ok(())
    }

    /// Downloaded file if the bound user has one on disk, else the remote URL
    async fn resolve_source(&self, track: &Track) -> AudioSource {
        if let Some(user_id) = self.identity() {
            match self.inner.downloads.cache().lookup(&user_id, &track.id).await {
                Ok(Some(path)) => {
                    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        return AudioSource::Local(path);
                    }
                    debug!("Registered file {:?} is missing, streaming instead", path);
                }
                Ok(None) => {}
                Err(e) => warn!("Download lookup failed, streaming instead: {}", e),
            }
        }
        AudioSource::Remote(track.audio_url.clone())
    }

    fn spawn_play_count_increment(&self, track_id: TrackId) {
        let backend = self.inner.backend.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.increment_play_count(&track_id).await {
                warn!("Failed to increment play count for {}: {}", track_id, e);
            }
        });
    }

    /// Pause from `Playing`; otherwise nothing happens
    pub async fn pause(&self) {
        if self.inner.state.status() != PlayerStatus::Playing {
            return;
        }
        let _session = self.inner.session.lock().await;
        if self.inner.state.status() != PlayerStatus::Playing {
            return;
        }

        self.inner.engine.pause().await;
        let position_ms = self.inner.engine.status().await.position_ms;
        self.inner.state.update(|s| {
            s.status = PlayerStatus::Paused;
            s.position_ms = position_ms;
        });
    }

    /// Resume from `Paused`; otherwise nothing happens
    pub async fn resume(&self) {
        if self.inner.state.status() != PlayerStatus::Paused {
            return;
        }
        let _session = self.inner.session.lock().await;
        if self.inner.state.status() != PlayerStatus::Paused {
            return;
        }

        self.inner.engine.resume().await;
        self.inner.state.update(|s| s.status = PlayerStatus::Playing);
    }

    /// Release the session and return to `Idle`. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.next_generation();
        let _session = self.inner.session.lock().await;

        self.inner.engine.stop().await;
        self.inner.state.update(|s| s.clear_session());
    }

    /// Seek within the bound track; ignored without one
    pub async fn seek(&self, position_ms: u64) {
        let _session = self.inner.session.lock().await;
        let snapshot = self.inner.state.snapshot();
        if !matches!(
            snapshot.status,
            PlayerStatus::Playing | PlayerStatus::Paused
        ) {
            return;
        }

        let position_ms = if snapshot.duration_ms > 0 {
            position_ms.min(snapshot.duration_ms)
        } else {
            position_ms
        };
        self.inner.engine.seek(position_ms).await;
        self.inner.state.update(|s| s.position_ms = position_ms);
    }

    /// Pull the engine's transport state into the published snapshot
    ///
    /// Runs on every poll tick. Skipped while a transport command holds
    /// the session.
    pub async fn sync_status(&self) {
        let Ok(_session) = self.inner.session.try_lock() else {
            return;
        };

        let progress = self.download_progress();
        if self.inner.state.status() == PlayerStatus::Idle {
            self.inner.state.update(|s| s.download_progress = progress);
            return;
        }

        let status = self.inner.engine.status().await;
        self.inner.state.update(|s| {
            s.download_progress = progress;
            if status.did_just_finish {
                s.status = PlayerStatus::Paused;
                s.position_ms = 0;
                return;
            }
            s.status = if status.is_playing {
                PlayerStatus::Playing
            } else {
                PlayerStatus::Paused
            };
            s.position_ms = status.position_ms;
            if status.duration_ms > 0 {
                s.duration_ms = status.duration_ms;
            }
        });

        if status.did_just_finish {
            info!("Track finished");
        }
    }

    // ============ Downloads ============

    /// Download a track for the bound user
    pub async fn download(&self, track: &Track) -> Result<PathBuf> {
        let user_id = self.identity();
        let result = self.inner.downloads.download(track, user_id.as_ref()).await;
        let progress = self.download_progress();
        self.inner.state.update(|s| s.download_progress = progress);
        Ok(result?)
    }

    /// Whether the bound user has this track on disk
    pub async fn is_downloaded(&self, track_id: &TrackId) -> bool {
        match self.identity() {
            Some(user_id) => {
                self.inner
                    .downloads
                    .cache()
                    .resolve_downloaded_state(&user_id, track_id)
                    .await
            }
            None => false,
        }
    }

    /// Remove the bound user's download of a track
    pub async fn delete_download(&self, track_id: &TrackId) -> Result<()> {
        let user_id = self.identity();
        self.inner
            .downloads
            .remove(track_id, user_id.as_ref())
            .await?;
        Ok(())
    }
}
