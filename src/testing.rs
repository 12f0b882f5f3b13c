//! Shared test fixtures: scratch databases, a scripted playback engine and
//! a local HTTP file server

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::audio::{AudioSource, EngineStatus, PlaybackEngine};
use crate::database::{
    CatalogImport, CategoryId, Database, NewCategory, NewTrack, Track, TrackId,
};

// ============ Database ============

/// Fresh database in a temporary directory
pub async fn open_temp() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(&dir.path().join("mezmur.db")).await.unwrap();
    (dir, db)
}

pub fn new_track(
    id: &str,
    title: &str,
    artist: Option<&str>,
    category: Option<&str>,
) -> NewTrack {
    NewTrack {
        id: TrackId::from(id),
        title: title.to_string(),
        artist: artist.map(str::to_string),
        category_id: category.map(CategoryId::from),
        audio_url: format!("https://cdn.example.com/{}.mp3", id),
        poem: None,
        duration: 180,
        image_url: None,
    }
}

/// Two categories and four tracks, one of them uncategorized
pub async fn seed(db: &Database) {
    let catalog = CatalogImport {
        categories: vec![
            NewCategory {
                id: CategoryId::from("praise"),
                name: "Praise".to_string(),
                description: None,
                icon: None,
            },
            NewCategory {
                id: CategoryId::from("advent"),
                name: "Advent".to_string(),
                description: Some("Seasonal".to_string()),
                icon: None,
            },
        ],
        tracks: vec![
            new_track("t1", "Kidus Kidus", Some("Choir A"), Some("praise")),
            new_track("t2", "Amen", Some("Zemari Tesfaye"), Some("praise")),
            new_track("t3", "Lullaby", None, Some("advent")),
            new_track("t4", "50% Off_Road", None, None),
        ],
    };
    assert_eq!(db.import_catalog(&catalog).await.unwrap(), (2, 4));
}

/// Track value not backed by any store
pub fn sample_track(id: &str, audio_url: &str) -> Track {
    let now = Utc::now();
    Track {
        id: TrackId::from(id),
        title: format!("Track {}", id),
        artist: None,
        category_id: None,
        audio_url: audio_url.to_string(),
        poem: None,
        duration: 180,
        image_url: None,
        play_count: 0,
        created_at: now,
        updated_at: now,
        category: None,
    }
}

// ============ Playback engine ============

#[derive(Debug, Default)]
struct FakeState {
    loaded: Option<AudioSource>,
    playing: bool,
    position_ms: u64,
    duration_ms: u64,
    finish_pending: bool,
    load_count: usize,
    failing: Vec<AudioSource>,
    delays: Vec<(AudioSource, Duration)>,
}

/// Scripted engine: loads succeed instantly unless told otherwise
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn fail_on(&self, source: AudioSource) {
        self.state.lock().failing.push(source);
    }

    pub fn delay_load(&self, source: AudioSource, delay: Duration) {
        self.state.lock().delays.push((source, delay));
    }

    /// Duration reported for every later load
    pub fn set_duration(&self, duration_ms: u64) {
        self.state.lock().duration_ms = duration_ms;
    }

    pub fn set_position(&self, position_ms: u64) {
        self.state.lock().position_ms = position_ms;
    }

    /// Simulate the output pausing without a command (e.g. device change)
    pub fn pause_externally(&self) {
        self.state.lock().playing = false;
    }

    /// Reach the end of the loaded track
    pub fn finish_track(&self) {
        let mut state = self.state.lock();
        if state.loaded.is_some() {
            state.finish_pending = true;
        }
    }

    pub fn loaded(&self) -> Option<AudioSource> {
        self.state.lock().loaded.clone()
    }

    pub fn live_sessions(&self) -> usize {
        usize::from(self.state.lock().loaded.is_some())
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().load_count
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn position(&self) -> u64 {
        self.state.lock().position_ms
    }
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    async fn load(&self, source: AudioSource, autoplay: bool) -> Result<(), String> {
        let delay = {
            let mut state = self.state.lock();
            state.loaded = None;
            state.playing = false;
            state
                .delays
                .iter()
                .find(|(s, _)| *s == source)
                .map(|(_, d)| *d)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.load_count += 1;
        if state.failing.contains(&source) {
            return Err("unsupported format".to_string());
        }
        state.loaded = Some(source);
        state.playing = autoplay;
        state.position_ms = 0;
        state.finish_pending = false;
        Ok(())
    }

    async fn pause(&self) {
        let mut state = self.state.lock();
        if state.loaded.is_some() {
            state.playing = false;
        }
    }

    async fn resume(&self) {
        let mut state = self.state.lock();
        if state.loaded.is_some() {
            state.playing = true;
        }
    }

    async fn stop(&self) {
        let mut state = self.state.lock();
        state.loaded = None;
        state.playing = false;
        state.position_ms = 0;
    }

    async fn seek(&self, position_ms: u64) {
        let mut state = self.state.lock();
        if state.loaded.is_some() {
            state.position_ms = position_ms;
        }
    }

    async fn status(&self) -> EngineStatus {
        let mut state = self.state.lock();
        if state.loaded.is_none() {
            return EngineStatus::default();
        }
        if state.finish_pending {
            state.finish_pending = false;
            state.playing = false;
            state.position_ms = 0;
            return EngineStatus {
                position_ms: 0,
                duration_ms: state.duration_ms,
                is_playing: false,
                did_just_finish: true,
            };
        }
        EngineStatus {
            position_ms: state.position_ms,
            duration_ms: state.duration_ms,
            is_playing: state.playing,
            did_just_finish: false,
        }
    }
}

// ============ HTTP ============

type Files = Arc<HashMap<String, Vec<u8>>>;

/// Serves fixed bodies at `/<name>` on 127.0.0.1, 404 for anything else
pub struct FileServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl FileServer {
    pub async fn start(files: Vec<(&str, Vec<u8>)>) -> Self {
        let files: Files = Arc::new(
            files
                .into_iter()
                .map(|(name, body)| (name.to_string(), body))
                .collect(),
        );
        let app = Router::new()
            .route("/{name}", get(serve_file))
            .with_state(files);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tracing::debug!("test file server listening on {}", addr);
        Self { addr, handle }
    }

    pub fn url(&self, name: &str) -> String {
        format!("http://{}/{}", self.addr, name)
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_file(State(files): State<Files>, Path(name): Path<String>) -> Response {
    match files.get(&name) {
        Some(body) => body.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// URL on a port nothing listens on
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/t1.mp3", addr)
}

/// URL on a listener that accepts connections but never answers
///
/// Requests hang until the returned listener is dropped.
pub async fn stalled_url() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("http://{}/t1.mp3", addr))
}
