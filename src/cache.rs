//! Local cache store
//!
//! Maps (user, track) to the path of a downloaded file and answers
//! "is this track available offline". Also handles maintenance of the
//! downloads directory: size statistics and removal of partial files left
//! behind by interrupted downloads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::database::{TrackId, UserId};
use crate::error::PersistenceError;
use crate::utils::is_partial_file;

/// Downloads directory statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Total size in bytes
    pub total_bytes: u64,
    /// Number of completed files
    pub file_count: usize,
    /// Number of partial files
    pub partial_count: usize,
}

impl CacheStats {
    /// Get total size in megabytes
    pub fn total_mb(&self) -> u64 {
        self.total_bytes / (1024 * 1024)
    }
}

/// Result of a cleanup pass
#[derive(Debug, Clone, Default)]
pub struct ClearResult {
    pub files_deleted: usize,
    pub bytes_freed: u64,
    pub errors: usize,
}

/// Registry of downloaded tracks plus the directory they live in
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn Backend>,
    downloads_dir: PathBuf,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("downloads_dir", &self.downloads_dir)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new(backend: Arc<dyn Backend>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            downloads_dir: downloads_dir.into(),
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Register a completed download, replacing any earlier entry
    pub async fn record_download(
        &self,
        user_id: &UserId,
        track_id: &TrackId,
        local_path: &Path,
    ) -> Result<(), PersistenceError> {
        let path = local_path.to_string_lossy();
        self.backend
            .add_download(user_id, track_id, &path)
            .await
            .map_err(PersistenceError::from)?;
        debug!("Registered download {} for {} at {}", track_id, user_id, path);
        Ok(())
    }

    /// Stored path for a track, whether or not the file still exists
    pub async fn lookup(
        &self,
        user_id: &UserId,
        track_id: &TrackId,
    ) -> Result<Option<PathBuf>, PersistenceError> {
        let path = self
            .backend
            .lookup_download(user_id, track_id)
            .await
            .map_err(PersistenceError::from)?;
        Ok(path.map(PathBuf::from))
    }

    /// Drop the registry entry. Removing a missing entry is fine.
    pub async fn forget(&self, user_id: &UserId, track_id: &TrackId) -> Result<(), PersistenceError> {
        self.backend
            .remove_download(user_id, track_id)
            .await
            .map_err(PersistenceError::from)
    }

    /// True only when an entry exists and its file is present on disk
    ///
    /// A stale entry is reported as not downloaded but left in place.
    pub async fn resolve_downloaded_state(&self, user_id: &UserId, track_id: &TrackId) -> bool {
        let path = match self.lookup(user_id, track_id).await {
            Ok(Some(path)) => path,
            Ok(None) => return false,
            Err(e) => {
                warn!("Download lookup failed for {}: {}", track_id, e);
                return false;
            }
        };

        match tokio::fs::try_exists(&path).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("Registered file for {} is gone: {:?}", track_id, path);
                false
            }
            Err(e) => {
                warn!("Failed to check {:?}: {}", path, e);
                false
            }
        }
    }

    /// Statistics over the downloads directory
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();

        for (path, size) in collect_files(&self.downloads_dir) {
            if is_partial_file(&path) {
                stats.partial_count += 1;
            } else {
                stats.file_count += 1;
            }
            stats.total_bytes += size;
        }

        stats
    }

    /// Remove partial files from interrupted downloads
    ///
    /// Call at startup, before any download is started.
    pub fn cleanup_temp_files(&self) -> ClearResult {
        let mut result = ClearResult::default();

        for (path, size) in collect_files(&self.downloads_dir) {
            if !is_partial_file(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(_) => {
                    info!("Cleaned up orphan partial file: {:?} ({} bytes)", path, size);
                    result.files_deleted += 1;
                    result.bytes_freed += size;
                }
                Err(e) => {
                    warn!("Failed to delete partial file {:?}: {}", path, e);
                    result.errors += 1;
                }
            }
        }

        if result.files_deleted > 0 {
            info!(
                "Partial file cleanup: {} files deleted, {} bytes freed",
                result.files_deleted, result.bytes_freed
            );
        }

        result
    }
}

/// Regular files in a directory with their sizes
fn collect_files(dir: &Path) -> Vec<(PathBuf, u64)> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read downloads directory {:?}: {}", dir, e);
            }
            return Vec::new();
        }
    };

    read_dir
        .flatten()
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            metadata.is_file().then(|| (entry.path(), metadata.len()))
        })
        .collect()
}
