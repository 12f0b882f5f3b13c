//! Database schema migrations

use anyhow::Result;
use sqlx::{Pool, Sqlite};

/// Run database migrations to create/update schema
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    // Categories table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            icon TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_categories_name ON categories(name);
        "#,
    )
    .execute(pool)
    .await?;

    // Tracks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            artist TEXT,
            category_id TEXT,
            audio_url TEXT NOT NULL,
            poem TEXT,
            duration INTEGER NOT NULL DEFAULT 0,
            image_url TEXT,
            play_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tracks_category ON tracks(category_id);
        CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks(title);
        "#,
    )
    .execute(pool)
    .await?;

    // Favorites: one row per (user, track)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS favorites (
            id TEXT PRIMARY KEY NOT NULL DEFAULT (lower(hex(randomblob(16)))),
            user_id TEXT NOT NULL,
            track_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (track_id) REFERENCES tracks(id) ON DELETE CASCADE,
            UNIQUE(user_id, track_id)
        );

        CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id);
        "#,
    )
    .execute(pool)
    .await?;

    // Download registry: one local file per (user, track)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS downloads (
            user_id TEXT NOT NULL,
            track_id TEXT NOT NULL,
            local_path TEXT NOT NULL,
            downloaded_at TEXT NOT NULL,
            PRIMARY KEY (user_id, track_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
