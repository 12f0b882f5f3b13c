//! Download manager
//!
//! Fetches a track's audio in full, writes it to the downloads directory
//! through a partial file and a rename, then registers it in the cache
//! store. A single shared progress value reports the most recently
//! started download.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::database::{Track, TrackId, UserId};
use crate::error::DownloadError;
use crate::utils::{
    DEFAULT_AUDIO_EXTENSION, PARTIAL_EXTENSION, extract_extension_from_url,
    sanitize_file_component,
};

/// Highest value reported while bytes are still arriving; 1.0 means registered
const MAX_IN_FLIGHT_PROGRESS: f64 = 0.99;

/// Sequence for partial file names, unique within the process
static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default)]
struct ProgressState {
    /// Ticket of the download that owns the value
    ticket: u64,
    value: f32,
}

#[derive(Debug)]
struct ProgressShared {
    state: Mutex<ProgressState>,
    tx: watch::Sender<f32>,
}

/// Shared download progress in [0, 1]
///
/// Only the most recently started download writes to it. Values are
/// non-decreasing over one download, 1.0 on completion and back to 0.0
/// after the reset delay or immediately on failure.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    shared: Arc<ProgressShared>,
}

impl Default for DownloadProgress {
    fn default() -> Self {
        let (tx, _) = watch::channel(0.0);
        Self {
            shared: Arc::new(ProgressShared {
                state: Mutex::new(ProgressState::default()),
                tx,
            }),
        }
    }
}

impl DownloadProgress {
    /// Current value
    pub fn get(&self) -> f32 {
        self.shared.state.lock().value
    }

    /// Watch every published value
    pub fn subscribe(&self) -> watch::Receiver<f32> {
        self.shared.tx.subscribe()
    }

    /// Take ownership of the progress value for a new download
    fn begin(&self) -> u64 {
        let mut state = self.shared.state.lock();
        state.ticket += 1;
        state.value = 0.0;
        self.shared.tx.send_replace(0.0);
        state.ticket
    }

    fn advance(&self, ticket: u64, value: f32) {
        let mut state = self.shared.state.lock();
        if state.ticket == ticket && value > state.value {
            state.value = value;
            self.shared.tx.send_replace(value);
        }
    }

    /// Report completion and schedule the reset to idle
    fn complete(&self, ticket: u64, reset_delay: Duration) {
        {
            let mut state = self.shared.state.lock();
            if state.ticket != ticket {
                return;
            }
            state.value = 1.0;
            self.shared.tx.send_replace(1.0);
        }

        let progress = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(reset_delay).await;
            progress.reset(ticket);
        });
    }

    fn reset(&self, ticket: u64) {
        let mut state = self.shared.state.lock();
        if state.ticket == ticket {
            state.value = 0.0;
            self.shared.tx.send_replace(0.0);
        }
    }
}

type InFlightKey = (UserId, TrackId);

/// Marks a (user, track) download as running until dropped
struct InFlightGuard {
    set: Arc<Mutex<HashSet<InFlightKey>>>,
    key: InFlightKey,
}

impl InFlightGuard {
    fn acquire(
        set: &Arc<Mutex<HashSet<InFlightKey>>>,
        user_id: &UserId,
        track_id: &TrackId,
    ) -> Result<Self, DownloadError> {
        let key = (user_id.clone(), track_id.clone());
        if !set.lock().insert(key.clone()) {
            return Err(DownloadError::InProgress(track_id.clone()));
        }
        Ok(Self {
            set: set.clone(),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

/// Downloads tracks for offline playback
#[derive(Debug, Clone)]
pub struct DownloadManager {
    http: reqwest::Client,
    cache: CacheStore,
    progress: DownloadProgress,
    in_flight: Arc<Mutex<HashSet<InFlightKey>>>,
    reset_delay: Duration,
}

impl DownloadManager {
    pub fn new(cache: CacheStore, reset_delay: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), cache, reset_delay)
    }

    pub fn with_client(http: reqwest::Client, cache: CacheStore, reset_delay: Duration) -> Self {
        Self {
            http,
            cache,
            progress: DownloadProgress::default(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            reset_delay,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn progress(&self) -> &DownloadProgress {
        &self.progress
    }

    /// Local path a track is stored at once downloaded
    ///
    /// Derived from the track id alone, so re-downloading overwrites.
    pub fn local_path_for(&self, track: &Track) -> PathBuf {
        let ext = extract_extension_from_url(&track.audio_url)
            .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string());
        self.cache.downloads_dir().join(format!(
            "{}.{}",
            sanitize_file_component(track.id.as_str()),
            ext
        ))
    }

    /// Fresh partial file for one download attempt
    ///
    /// Concurrent downloads of the same track never share one.
    fn partial_path_for(&self, track_id: &TrackId) -> PathBuf {
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        self.cache.downloads_dir().join(format!(
            "{}.{}-{}.{}",
            sanitize_file_component(track_id.as_str()),
            std::process::id(),
            seq,
            PARTIAL_EXTENSION
        ))
    }

    /// Download a track and register it for the user
    pub async fn download(
        &self,
        track: &Track,
        user_id: Option<&UserId>,
    ) -> Result<PathBuf, DownloadError> {
        let user_id = user_id.ok_or(DownloadError::AuthRequired)?;
        let _guard = InFlightGuard::acquire(&self.in_flight, user_id, &track.id)?;
        let ticket = self.progress.begin();

        info!("Downloading {} ({})", track.title, track.id);

        match self.fetch_and_register(track, user_id, ticket).await {
            Ok(path) => {
                self.progress.complete(ticket, self.reset_delay);
                info!("Saved {} to {:?}", track.id, path);
                Ok(path)
            }
            Err(e) => {
                self.progress.reset(ticket);
                error!("Download of {} failed: {}", track.id, e);
                Err(e)
            }
        }
    }

    async fn fetch_and_register(
        &self,
        track: &Track,
        user_id: &UserId,
        ticket: u64,
    ) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(self.cache.downloads_dir()).await?;

        let part_path = self.partial_path_for(&track.id);
        let final_path = self.local_path_for(track);

        let written = self.write_partial(track, &part_path, ticket).await;
        // Other registry entries may already point at the file being replaced
        let replaces_existing = tokio::fs::try_exists(&final_path).await.unwrap_or(true);
        let renamed = match written {
            Ok(()) => tokio::fs::rename(&part_path, &final_path)
                .await
                .map_err(DownloadError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = renamed {
            remove_quietly(&part_path).await;
            return Err(e);
        }

        if let Err(e) = self
            .cache
            .record_download(user_id, &track.id, &final_path)
            .await
        {
            if !replaces_existing {
                remove_quietly(&final_path).await;
            }
            return Err(e.into());
        }

        Ok(final_path)
    }

    async fn write_partial(
        &self,
        track: &Track,
        part_path: &Path,
        ticket: u64,
    ) -> Result<(), DownloadError> {
        let response = self.http.get(&track.audio_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http(status));
        }

        let total = response.content_length().filter(|&len| len > 0);
        if total.is_none() {
            debug!("No content length for {}, progress stays at 0", track.id);
        }

        let mut file = tokio::fs::File::create(part_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total {
                let fraction = (downloaded as f64 / total as f64).min(MAX_IN_FLIGHT_PROGRESS);
                self.progress.advance(ticket, fraction as f32);
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Delete a track's local file and registry entry
    ///
    /// Without a user there is nothing to remove.
    pub async fn remove(
        &self,
        track_id: &TrackId,
        user_id: Option<&UserId>,
    ) -> Result<(), DownloadError> {
        let Some(user_id) = user_id else {
            debug!("No user bound, nothing to remove for {}", track_id);
            return Ok(());
        };

        if let Some(path) = self.cache.lookup(user_id, track_id).await? {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Deleted download {:?}", path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Download {:?} already gone", path);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.cache.forget(user_id, track_id).await?;
        Ok(())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {:?}: {}", path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::testing::{FileServer, open_temp, sample_track, stalled_url};

    const RESET: Duration = Duration::from_millis(100);

    async fn manager() -> (tempfile::TempDir, DownloadManager) {
        let (dir, db) = open_temp().await;
        let cache = CacheStore::new(Arc::new(db), dir.path().join("downloads"));
        (dir, DownloadManager::new(cache, RESET))
    }

    fn mock_manager(backend: MockBackend) -> (tempfile::TempDir, DownloadManager) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(Arc::new(backend), dir.path().join("downloads"));
        (dir, DownloadManager::new(cache, RESET))
    }

    fn file_count(manager: &DownloadManager) -> usize {
        std::fs::read_dir(manager.cache().downloads_dir())
            .map(|rd| rd.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_download_writes_file_and_registers() {
        let server = FileServer::start(vec![("t1.mp3", b"ID3 audio bytes".to_vec())]).await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("t1", &server.url("t1.mp3"));

        let path = manager.download(&track, Some(&user)).await.unwrap();

        assert_eq!(path, manager.local_path_for(&track));
        assert_eq!(path.file_name().unwrap(), "t1.mp3");
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3 audio bytes");
        assert!(
            manager
                .cache()
                .resolve_downloaded_state(&user, &track.id)
                .await
        );
        assert_eq!(file_count(&manager), 1);
    }

    #[tokio::test]
    async fn test_extension_follows_url() {
        let server = FileServer::start(vec![
            ("a.flac", b"fLaC".to_vec()),
            ("stream", b"raw".to_vec()),
        ])
        .await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");

        let flac = manager
            .download(&sample_track("a", &server.url("a.flac")), Some(&user))
            .await
            .unwrap();
        assert_eq!(flac.extension().unwrap(), "flac");

        let bare = manager
            .download(&sample_track("b", &server.url("stream")), Some(&user))
            .await
            .unwrap();
        assert_eq!(bare.extension().unwrap(), "mp3");
    }

    #[tokio::test]
    async fn test_redownload_overwrites() {
        let server = FileServer::start(vec![("t1.mp3", b"v1".to_vec())]).await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("t1", &server.url("t1.mp3"));

        let first = manager.download(&track, Some(&user)).await.unwrap();
        let second = manager.download(&track, Some(&user)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(file_count(&manager), 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_then_resets() {
        let body = vec![7u8; 512 * 1024];
        let server = FileServer::start(vec![("big.mp3", body)]).await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("big", &server.url("big.mp3"));

        let mut rx = manager.progress().subscribe();
        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let value = *rx.borrow_and_update();
                seen.push(value);
                if value == 0.0 && seen.contains(&1.0) {
                    break;
                }
            }
            seen
        });

        manager.download(&track, Some(&user)).await.unwrap();
        assert_eq!(manager.progress().get(), 1.0);

        let seen = tokio::time::timeout(Duration::from_secs(5), observer)
            .await
            .unwrap()
            .unwrap();
        let peak = seen.iter().position(|&v| v == 1.0).unwrap();
        assert!(seen[..=peak].windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&0.0));
        assert_eq!(manager.progress().get(), 0.0);
    }

    #[tokio::test]
    async fn test_http_failure_leaves_nothing_behind() {
        let server = FileServer::start(vec![]).await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("t1", &server.url("missing.mp3"));

        let err = manager.download(&track, Some(&user)).await.unwrap_err();

        assert!(matches!(err, DownloadError::Http(s) if s == reqwest::StatusCode::NOT_FOUND));
        assert_eq!(manager.progress().get(), 0.0);
        assert_eq!(manager.cache().lookup(&user, &track.id).await.unwrap(), None);
        assert_eq!(file_count(&manager), 0);
    }

    #[tokio::test]
    async fn test_network_failure_resets_progress() {
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("t1", &crate::testing::unreachable_url());

        let err = manager.download(&track, Some(&user)).await.unwrap_err();

        assert!(matches!(err, DownloadError::Network(_)));
        assert_eq!(manager.progress().get(), 0.0);
        assert_eq!(file_count(&manager), 0);
    }

    #[tokio::test]
    async fn test_download_requires_user() {
        let (_dir, manager) = manager().await;
        let track = sample_track("t1", "http://127.0.0.1:9/t1.mp3");

        let err = manager.download(&track, None).await.unwrap_err();

        assert!(matches!(err, DownloadError::AuthRequired));
        assert_eq!(manager.progress().get(), 0.0);
        assert!(!manager.cache().downloads_dir().exists());
    }

    #[tokio::test]
    async fn test_remove_deletes_file_and_entry() {
        let server = FileServer::start(vec![("t1.mp3", b"audio".to_vec())]).await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("t1", &server.url("t1.mp3"));
        let path = manager.download(&track, Some(&user)).await.unwrap();

        manager.remove(&track.id, Some(&user)).await.unwrap();

        assert!(!path.exists());
        assert!(
            !manager
                .cache()
                .resolve_downloaded_state(&user, &track.id)
                .await
        );
        assert_eq!(manager.cache().lookup(&user, &track.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_without_download_or_user() {
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track_id = TrackId::from("never");

        manager.remove(&track_id, Some(&user)).await.unwrap();
        manager.remove(&track_id, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_tolerates_externally_deleted_file() {
        let server = FileServer::start(vec![("t1.mp3", b"audio".to_vec())]).await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("t1", &server.url("t1.mp3"));
        let path = manager.download(&track, Some(&user)).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(
            !manager
                .cache()
                .resolve_downloaded_state(&user, &track.id)
                .await
        );

        manager.remove(&track.id, Some(&user)).await.unwrap();
        assert_eq!(manager.cache().lookup(&user, &track.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_distinct_ids_get_distinct_files() {
        let server = FileServer::start(vec![
            ("dot.mp3", b"dotted".to_vec()),
            ("under.mp3", b"underscored".to_vec()),
        ])
        .await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let dotted = sample_track("x.1", &server.url("dot.mp3"));
        let underscored = sample_track("x_1", &server.url("under.mp3"));

        let a = manager.download(&dotted, Some(&user)).await.unwrap();
        let b = manager.download(&underscored, Some(&user)).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"dotted");
        assert_eq!(std::fs::read(&b).unwrap(), b"underscored");
        assert_eq!(file_count(&manager), 2);
    }

    #[tokio::test]
    async fn test_two_users_download_same_track_concurrently() {
        let body: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        let server = FileServer::start(vec![("t1.mp3", body.clone())]).await;
        let (_dir, manager) = manager().await;
        let track = sample_track("t1", &server.url("t1.mp3"));
        let (u1, u2) = (UserId::from("u1"), UserId::from("u2"));

        let (a, b) = tokio::join!(
            manager.download(&track, Some(&u1)),
            manager.download(&track, Some(&u2))
        );

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), body);
        assert_eq!(file_count(&manager), 1);
        assert!(manager.cache().resolve_downloaded_state(&u1, &track.id).await);
        assert!(manager.cache().resolve_downloaded_state(&u2, &track.id).await);
    }

    #[tokio::test]
    async fn test_same_download_twice_is_rejected_while_running() {
        let (_listener, url) = stalled_url().await;
        let (_dir, manager) = manager().await;
        let user = UserId::from("u1");
        let track = sample_track("t1", &url);

        let first = {
            let manager = manager.clone();
            let track = track.clone();
            let user = user.clone();
            tokio::spawn(async move { manager.download(&track, Some(&user)).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.in_flight.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let ticket = manager.progress.shared.state.lock().ticket;

        let err = manager.download(&track, Some(&user)).await.unwrap_err();

        assert!(matches!(err, DownloadError::InProgress(id) if id == track.id));
        assert_eq!(manager.progress().get(), 0.0);
        assert_eq!(manager.progress.shared.state.lock().ticket, ticket);

        first.abort();
        let _ = first.await;
        assert!(manager.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_registry_failure_removes_new_file() {
        let server = FileServer::start(vec![("t1.mp3", b"audio".to_vec())]).await;
        let mut backend = MockBackend::new();
        backend
            .expect_add_download()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("disk full")));
        let (_dir, manager) = mock_manager(backend);
        let user = UserId::from("u1");
        let track = sample_track("t1", &server.url("t1.mp3"));

        let err = manager.download(&track, Some(&user)).await.unwrap_err();

        assert!(matches!(err, DownloadError::Persistence(_)));
        assert_eq!(manager.progress().get(), 0.0);
        assert_eq!(file_count(&manager), 0);
    }

    #[tokio::test]
    async fn test_registry_failure_keeps_file_other_entries_use() {
        let server = FileServer::start(vec![("t1.mp3", b"audio".to_vec())]).await;
        let mut backend = MockBackend::new();
        backend.expect_add_download().returning(|user, _, _| {
            if user.as_str() == "u1" {
                Ok(())
            } else {
                Err(anyhow::anyhow!("disk full"))
            }
        });
        let (_dir, manager) = mock_manager(backend);
        let track = sample_track("t1", &server.url("t1.mp3"));

        let path = manager
            .download(&track, Some(&UserId::from("u1")))
            .await
            .unwrap();
        let err = manager
            .download(&track, Some(&UserId::from("u2")))
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Persistence(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"audio");
        assert_eq!(file_count(&manager), 1);
    }

    #[test]
    fn test_in_flight_guard_rejects_duplicates() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let user = UserId::from("u1");
        let track = TrackId::from("t1");

        let guard = InFlightGuard::acquire(&set, &user, &track).unwrap();
        assert!(matches!(
            InFlightGuard::acquire(&set, &user, &track),
            Err(DownloadError::InProgress(id)) if id == track
        ));
        // Another user is independent
        let other = InFlightGuard::acquire(&set, &UserId::from("u2"), &track).unwrap();

        drop(guard);
        drop(other);
        assert!(InFlightGuard::acquire(&set, &user, &track).is_ok());
    }

    #[tokio::test]
    async fn test_stale_ticket_cannot_write_progress() {
        let progress = DownloadProgress::default();
        let old = progress.begin();
        let new = progress.begin();

        progress.advance(old, 0.5);
        assert_eq!(progress.get(), 0.0);

        progress.advance(new, 0.4);
        progress.advance(new, 0.2);
        assert_eq!(progress.get(), 0.4);

        progress.reset(old);
        assert_eq!(progress.get(), 0.4);
    }
}
