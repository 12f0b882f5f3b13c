//! Data-access interface to the catalog backend
//!
//! The player and library only talk to the backend through [`Backend`].
//! Two implementations exist:
//! - [`crate::database::Database`]: local SQLite catalog and registry
//! - [`SupabaseClient`]: the hosted PostgREST backend

mod supabase;

use anyhow::Result;
use async_trait::async_trait;

use crate::database::{Category, CategoryId, DownloadRecord, Favorite, Track, TrackId, UserId};

pub use supabase::SupabaseClient;

/// Catalog, favorites and download-registry access
///
/// All operations are single-record reads or writes; none require
/// multi-record transactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// All tracks, newest first
    async fn fetch_tracks(&self) -> Result<Vec<Track>>;

    /// Tracks of one category, ordered by title
    async fn fetch_tracks_by_category(&self, category_id: &CategoryId) -> Result<Vec<Track>>;

    /// Case-insensitive substring match over title and artist
    async fn search_tracks(&self, query: &str) -> Result<Vec<Track>>;

    async fn fetch_track(&self, track_id: &TrackId) -> Result<Option<Track>>;

    /// All categories, ordered by name
    async fn fetch_categories(&self) -> Result<Vec<Category>>;

    async fn increment_play_count(&self, track_id: &TrackId) -> Result<()>;

    // ============ Favorites ============

    async fn list_favorites(&self, user_id: &UserId) -> Result<Vec<Favorite>>;

    async fn add_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<()>;

    async fn remove_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<()>;

    async fn is_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<bool>;

    // ============ Download registry ============

    async fn list_downloads(&self, user_id: &UserId) -> Result<Vec<DownloadRecord>>;

    /// Upsert the local path of a downloaded track
    async fn add_download(&self, user_id: &UserId, track_id: &TrackId, local_path: &str)
    -> Result<()>;

    async fn remove_download(&self, user_id: &UserId, track_id: &TrackId) -> Result<()>;

    async fn lookup_download(&self, user_id: &UserId, track_id: &TrackId)
    -> Result<Option<String>>;
}
