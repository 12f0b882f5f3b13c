//! Database repository - main entry point
//! Delegates to ops modules for actual operations

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
use std::path::Path;

use super::{models::*, ops, schema};
use crate::backend::Backend;

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create and initialize database at the given path
    pub async fn new(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        // WAL keeps registry reads from blocking behind download writes
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;

        schema::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    // ============ Catalog seeding ============

    pub async fn upsert_category(&self, category: &NewCategory) -> Result<()> {
        ops::upsert_category(&self.pool, category).await
    }

    pub async fn upsert_track(&self, track: &NewTrack) -> Result<()> {
        ops::upsert_track(&self.pool, track).await
    }

    /// Import a catalog file, categories first so track references resolve
    pub async fn import_catalog(&self, catalog: &CatalogImport) -> Result<(usize, usize)> {
        for category in &catalog.categories {
            self.upsert_category(category).await?;
        }
        for track in &catalog.tracks {
            self.upsert_track(track).await?;
        }
        Ok((catalog.categories.len(), catalog.tracks.len()))
    }
}

#[async_trait]
impl Backend for Database {
    async fn fetch_tracks(&self) -> Result<Vec<Track>> {
        ops::get_tracks(&self.pool).await
    }

    async fn fetch_tracks_by_category(&self, category_id: &CategoryId) -> Result<Vec<Track>> {
        ops::get_tracks_by_category(&self.pool, category_id).await
    }

    async fn search_tracks(&self, query: &str) -> Result<Vec<Track>> {
        ops::search_tracks(&self.pool, query).await
    }

    async fn fetch_track(&self, track_id: &TrackId) -> Result<Option<Track>> {
        ops::get_track(&self.pool, track_id).await
    }

    async fn fetch_categories(&self) -> Result<Vec<Category>> {
        ops::get_categories(&self.pool).await
    }

    async fn increment_play_count(&self, track_id: &TrackId) -> Result<()> {
        ops::increment_play_count(&self.pool, track_id).await
    }

    // ============ Favorites ============

    async fn list_favorites(&self, user_id: &UserId) -> Result<Vec<Favorite>> {
        ops::get_favorites(&self.pool, user_id).await
    }

    async fn add_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<()> {
        ops::add_favorite(&self.pool, user_id, track_id).await
    }

    async fn remove_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<()> {
        ops::remove_favorite(&self.pool, user_id, track_id).await
    }

    async fn is_favorite(&self, user_id: &UserId, track_id: &TrackId) -> Result<bool> {
        ops::is_favorite(&self.pool, user_id, track_id).await
    }

    // ============ Download registry ============

    async fn list_downloads(&self, user_id: &UserId) -> Result<Vec<DownloadRecord>> {
        ops::get_downloads(&self.pool, user_id).await
    }

    async fn add_download(
        &self,
        user_id: &UserId,
        track_id: &TrackId,
        local_path: &str,
    ) -> Result<()> {
        ops::add_download(&self.pool, user_id, track_id, local_path).await
    }

    async fn remove_download(&self, user_id: &UserId, track_id: &TrackId) -> Result<()> {
        ops::remove_download(&self.pool, user_id, track_id).await
    }

    async fn lookup_download(
        &self,
        user_id: &UserId,
        track_id: &TrackId,
    ) -> Result<Option<String>> {
        ops::lookup_download(&self.pool, user_id, track_id).await
    }
}
