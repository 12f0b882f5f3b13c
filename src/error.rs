//! Error types for playback, downloads and the cache registry

use thiserror::Error;

use crate::database::TrackId;

/// Cache registry read or write failure
#[derive(Debug, Error)]
#[error("Cache registry error: {0}")]
pub struct PersistenceError(pub anyhow::Error);

impl From<anyhow::Error> for PersistenceError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

/// Download failures
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Downloads are registered per user
    #[error("Must be signed in to download")]
    AuthRequired,

    /// A download of the same track for the same user is already running
    #[error("Download already in progress for track {0}")]
    InProgress(TrackId),

    /// Server answered with a non-success status
    #[error("Download failed with HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Player coordinator errors
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Operation requires a signed-in user
    #[error("Must be signed in")]
    AuthRequired,

    /// The audio source could not be opened
    #[error("Could not play this track: {0}")]
    PlaybackLoad(String),

    /// A newer play or stop request replaced this one before it finished loading
    #[error("Playback request superseded")]
    Superseded,

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<anyhow::Error> for DownloadError {
    fn from(err: anyhow::Error) -> Self {
        Self::Persistence(PersistenceError(err))
    }
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_error_wraps_backend_failure() {
        let err = PersistenceError::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.to_string(), "Cache registry error: disk full");
    }

    #[test]
    fn test_download_error_surfaces_through_player_error() {
        let err = PlayerError::from(DownloadError::AuthRequired);
        assert!(matches!(
            err,
            PlayerError::Download(DownloadError::AuthRequired)
        ));
        assert_eq!(err.to_string(), "Must be signed in to download");
    }
}
