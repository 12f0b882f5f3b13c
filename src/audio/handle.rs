//! `RodioEngine`: async handle to the audio thread
//!
//! Transport commands are fire-and-forget. `load` and `status` wait for the
//! audio thread's answer. Remote sources are downloaded here, on the async
//! side, so the audio thread never blocks on the network.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::thread::{AudioCommand, AudioCommandSender, SourceData, spawn_audio_thread};
use super::{AudioSource, EngineStatus, PlaybackEngine};

/// Playback engine backed by rodio
pub struct RodioEngine {
    command_tx: AudioCommandSender,
    http: reqwest::Client,
    _thread: JoinHandle<()>,
}

impl std::fmt::Debug for RodioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioEngine").finish_non_exhaustive()
    }
}

impl RodioEngine {
    /// Open the output device (None = system default) and start the audio thread
    pub fn new(device_name: Option<&str>) -> Result<Self, String> {
        let (command_tx, thread) = spawn_audio_thread(device_name.map(|s| s.to_string()))?;
        Ok(Self {
            command_tx,
            http: reqwest::Client::new(),
            _thread: thread,
        })
    }

    fn send(&self, cmd: AudioCommand) {
        if self.command_tx.send(cmd).is_err() {
            tracing::warn!("Audio thread is gone, command dropped");
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<Arc<[u8]>, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to fetch audio: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read audio: {}", e))?;
        tracing::debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(Arc::from(bytes.as_ref()))
    }
}

#[async_trait]
impl PlaybackEngine for RodioEngine {
    async fn load(&self, source: AudioSource, autoplay: bool) -> Result<(), String> {
        // Release the current session before a potentially slow fetch
        self.send(AudioCommand::Stop);

        let data = match source {
            AudioSource::Local(path) => SourceData::File(path),
            AudioSource::Remote(url) => SourceData::Memory(self.fetch_remote(&url).await?),
        };

        let (reply, rx) = oneshot::channel();
        self.send(AudioCommand::Load {
            data,
            autoplay,
            reply,
        });
        rx.await
            .map_err(|_| "Audio thread stopped while loading".to_string())?
    }

    async fn pause(&self) {
        self.send(AudioCommand::Pause);
    }

    async fn resume(&self) {
        self.send(AudioCommand::Resume);
    }

    async fn stop(&self) {
        self.send(AudioCommand::Stop);
    }

    async fn seek(&self, position_ms: u64) {
        self.send(AudioCommand::Seek {
            position: Duration::from_millis(position_ms),
        });
    }

    async fn status(&self) -> EngineStatus {
        let (reply, rx) = oneshot::channel();
        self.send(AudioCommand::Status { reply });
        rx.await.unwrap_or_default()
    }
}
