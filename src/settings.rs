//! Application settings persistence
//!
//! Handles saving and loading user preferences.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::database::UserId;

/// Shortest allowed delay before download progress returns to idle
const MIN_PROGRESS_RESET_MS: u64 = 500;
/// Longest allowed delay before download progress returns to idle
const MAX_PROGRESS_RESET_MS: u64 = 2000;

/// Which catalog backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local SQLite catalog
    #[default]
    Local,
    /// Hosted PostgREST backend
    Supabase,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Supabase => write!(f, "supabase"),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Signed-in user, if any
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Backend settings
    #[serde(default)]
    pub backend: BackendSettings,
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,
    /// Playback settings
    #[serde(default)]
    pub playback: PlaybackSettings,
}

/// Backend connection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub kind: BackendKind,
    /// Project URL of the hosted backend
    #[serde(default)]
    pub supabase_url: Option<String>,
    /// Public project key
    #[serde(default)]
    pub anon_key: Option<String>,
    /// Access token of the signed-in user
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Where local data lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Override for the SQLite database location
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Override for the downloads directory
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,
}

/// Playback-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Interval between transport status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay before a completed download's progress returns to 0
    #[serde(default = "default_progress_reset_ms")]
    pub progress_reset_ms: u64,
    /// Audio output device name (None = system default)
    #[serde(default)]
    pub output_device: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_progress_reset_ms() -> u64 {
    1000
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            progress_reset_ms: default_progress_reset_ms(),
            output_device: None,
        }
    }
}

impl PlaybackSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Progress reset delay, clamped to 0.5-2 seconds
    pub fn progress_reset_delay(&self) -> Duration {
        Duration::from_millis(
            self.progress_reset_ms
                .clamp(MIN_PROGRESS_RESET_MS, MAX_PROGRESS_RESET_MS),
        )
    }
}

impl StorageSettings {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(crate::utils::database_path)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir
            .clone()
            .unwrap_or_else(crate::utils::downloads_dir)
    }
}

impl Settings {
    /// Get the settings file path
    pub fn file_path() -> Option<PathBuf> {
        crate::utils::settings_path()
    }

    /// Load settings from file, or return defaults if not found
    pub fn load() -> Self {
        Self::file_path()
            .and_then(|path| Self::load_from_file(&path).ok())
            .unwrap_or_default()
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SettingsError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Save settings to the default file
    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(path) = Self::file_path() {
            self.save_to_file(&path)
        } else {
            Err(SettingsError::Io(
                "Could not determine config directory".to_string(),
            ))
        }
    }

    /// Save settings to a specific file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| SettingsError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Errors that can occur with settings
#[derive(Debug, Clone)]
pub enum SettingsError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}
